// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent role inference from the ROLE.md definition file.
//!
//! The role is declared either in a YAML front-matter block
//! (`---\nrole: dev\n---`) or inferred from content keywords. Absent both,
//! the role defaults to `pm`. Loading (and the hard error on an empty
//! file) is the daemon's job; this module only interprets content.

use serde::{Deserialize, Serialize};

/// Role label passed to the in-container runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Pm,
    Dev,
}

crate::simple_display! {
    Role {
        Pm => "pm",
        Dev => "dev",
    }
}

#[derive(Deserialize)]
struct FrontMatter {
    #[serde(default)]
    role: String,
}

/// Extract the YAML front-matter block between leading `---` fences.
fn front_matter(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

impl Role {
    /// Parse a role label (`pm`/`dev`), tolerating case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pm" => Some(Self::Pm),
            "dev" => Some(Self::Dev),
            _ => None,
        }
    }

    /// Infer the role from ROLE.md content.
    ///
    /// Front matter wins; otherwise content keywords decide
    /// (`pm`/`product manager` vs `dev`/`developer`/`software engineer`);
    /// default is `pm`.
    pub fn infer(content: &str) -> Self {
        if let Some(block) = front_matter(content) {
            if let Ok(fm) = serde_yaml::from_str::<FrontMatter>(block) {
                if let Some(role) = Self::parse(&fm.role) {
                    return role;
                }
            }
        }

        let lower = content.to_ascii_lowercase();
        if lower.contains("product manager") {
            return Self::Pm;
        }
        if lower.contains("software engineer") || lower.contains("developer") {
            return Self::Dev;
        }
        // Bare keyword scan, word-bounded so "devops" doesn't match "dev".
        for word in lower.split(|c: char| !c.is_ascii_alphanumeric()) {
            match word {
                "pm" => return Self::Pm,
                "dev" => return Self::Dev,
                _ => {}
            }
        }
        Self::Pm
    }
}

#[cfg(test)]
#[path = "role_tests.rs"]
mod tests;
