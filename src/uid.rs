use std::collections::HashMap;

use chrono::Local;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Longest UID allowed by the standard.
pub const MAX_UID_LEN: usize = 64;

/// Source of new UIDs.
#[derive(Debug, Clone)]
pub enum UidGenerator {
    /// `<root><date>.<time>.<microseconds>.<pid>.<n>` under an organisation root.
    Rooted { root: String, counter: u64 },
    /// `2.25.<uuid>`, which needs no registered root.
    Uuid,
}

impl UidGenerator {
    /// Use `root` as prefix, `None` for UUID-derived UIDs.
    pub fn new(root: Option<String>) -> Result<Self> {
        match root {
            Some(root) => {
                let root = if root.ends_with('.') { root } else { format!("{root}.") };
                if !is_valid_uid(root.trim_end_matches('.')) {
                    return Err(Error::InvalidUid(root));
                }
                Ok(UidGenerator::Rooted { root, counter: 0 })
            }
            None => Ok(UidGenerator::Uuid),
        }
    }

    pub fn generate(&mut self) -> Result<String> {
        let uid = match self {
            UidGenerator::Rooted { root, counter } => {
                *counter += 1;
                let now = Local::now();
                format!(
                    "{root}{}.{}.{}.{}.{}",
                    now.format("%Y%m%d"),
                    trim_zeros(&now.format("%H%M%S").to_string()),
                    trim_zeros(&now.format("%6f").to_string()),
                    std::process::id(),
                    counter
                )
            }
            UidGenerator::Uuid => format!("2.25.{}", Uuid::new_v4().as_u128()),
        };
        if !is_valid_uid(&uid) {
            return Err(Error::InvalidUid(uid));
        }
        Ok(uid)
    }
}

/// Components other than `0` itself must not start with a zero.
fn trim_zeros(component: &str) -> &str {
    let trimmed = component.trim_start_matches('0');
    if trimmed.is_empty() { "0" } else { trimmed }
}

/// Dotted decimal, no empty or zero-padded components, at most 64 characters.
pub fn is_valid_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.len() <= MAX_UID_LEN
        && uid.split('.').all(|c| {
            !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()) && (c == "0" || !c.starts_with('0'))
        })
}

/// Replaces UIDs consistently: the same old UID always maps to the same new one.
#[derive(Debug)]
pub struct UidRemapper {
    generator: UidGenerator,
    map: HashMap<String, String>,
}

impl UidRemapper {
    pub fn new(generator: UidGenerator) -> Self {
        Self {
            generator,
            map: HashMap::new(),
        }
    }

    pub fn remap(&mut self, old: &str) -> Result<String> {
        if let Some(new) = self.map.get(old) {
            return Ok(new.clone());
        }
        let new = self.generator.generate()?;
        self.map.insert(old.to_string(), new.clone());
        Ok(new)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
