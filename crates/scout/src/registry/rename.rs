//! Device rename propagation
//!
//! A rename touches several independent structures. Each step is attempted
//! regardless of the others; the outcome of every step is collected in a
//! [`RenameReport`] that is logged once.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::types::Result;

/// A collaborator holding persisted references to device names
pub trait ReferenceRewriter: Send + Sync {
    fn name(&self) -> &str;

    /// Rewrite references from `old` to `new`; returns the number rewritten
    fn rewrite_device(&self, old: &str, new: &str) -> Result<usize>;
}

/// Outcome of one rename step
#[derive(Debug)]
pub struct RenameStep {
    pub name: String,
    /// Items moved, or the failure
    pub result: std::result::Result<usize, String>,
}

#[derive(Debug)]
pub struct RenameReport {
    pub old: String,
    pub new: String,
    pub steps: Vec<RenameStep>,
}

impl RenameReport {
    pub fn new(old: &str, new: &str) -> Self {
        Self {
            old: old.to_string(),
            new: new.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, name: &str, result: Result<usize>) {
        self.steps.push(RenameStep {
            name: name.to_string(),
            result: result.map_err(|e| e.to_string()),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.result.is_ok())
    }

    pub fn step(&self, name: &str) -> Option<&RenameStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn log(&self) {
        let summary: Vec<String> = self
            .steps
            .iter()
            .map(|s| match &s.result {
                Ok(n) => format!("{}={}", s.name, n),
                Err(e) => format!("{}=FAILED({})", s.name, e),
            })
            .collect();

        if self.is_clean() {
            tracing::info!("Renamed device {} -> {} [{}]", self.old, self.new, summary.join(", "));
        } else {
            tracing::warn!(
                "Renamed device {} -> {} with failures [{}]",
                self.old,
                self.new,
                summary.join(", ")
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Script Tokens
// ─────────────────────────────────────────────────────────────────────────────

/// User scripts referring to signals through `{{TAG:Device::address[#n]}}`
/// tokens
#[derive(Default)]
pub struct ScriptTokens {
    scripts: RwLock<BTreeMap<String, String>>,
}

impl ScriptTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a unique address
    pub fn make_token(unique_address: &str) -> String {
        format!("{{{{TAG:{}}}}}", unique_address)
    }

    /// Unique addresses referenced by `code`, in order
    pub fn extract_tokens(code: &str) -> Vec<&str> {
        let mut tokens = Vec::new();
        let mut rest = code;
        while let Some(start) = rest.find("{{TAG:") {
            let after = &rest[start + 6..];
            let Some(end) = after.find("}}") else {
                break;
            };
            tokens.push(&after[..end]);
            rest = &after[end + 2..];
        }
        tokens
    }

    pub fn set_script(&self, name: impl Into<String>, code: impl Into<String>) {
        self.scripts.write().insert(name.into(), code.into());
    }

    pub fn script(&self, name: &str) -> Option<String> {
        self.scripts.read().get(name).cloned()
    }
}

impl ReferenceRewriter for ScriptTokens {
    fn name(&self) -> &str {
        "script_tokens"
    }

    fn rewrite_device(&self, old: &str, new: &str) -> Result<usize> {
        let from = format!("{{{{TAG:{}::", old);
        let to = format!("{{{{TAG:{}::", new);

        let mut rewritten = 0;
        for code in self.scripts.write().values_mut() {
            let count = code.matches(&from).count();
            if count > 0 {
                *code = code.replace(&from, &to);
                rewritten += count;
            }
        }
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Error;

    #[test]
    fn test_extract_tokens() {
        let code = "a = read({{TAG:IED1::LD1/XCBR1.Pos.stVal}})\nb = {{TAG:IED1::LD1/GGIO1.Ind1.stVal#2}} + {{TAG:broken";
        assert_eq!(
            ScriptTokens::extract_tokens(code),
            vec!["IED1::LD1/XCBR1.Pos.stVal", "IED1::LD1/GGIO1.Ind1.stVal#2"]
        );
        assert_eq!(ScriptTokens::make_token("A::x"), "{{TAG:A::x}}");
    }

    #[test]
    fn test_rewrite_tokens() {
        let tokens = ScriptTokens::new();
        tokens.set_script("trip", "x = {{TAG:Bay1::LD1/XCBR1.Pos.stVal}}; y = {{TAG:Bay10::LD1/X.y}}");
        tokens.set_script("other", "z = {{TAG:IED9::LD1/X.y}}");

        assert_eq!(tokens.rewrite_device("Bay1", "IED1").unwrap(), 1);
        assert_eq!(
            tokens.script("trip").unwrap(),
            "x = {{TAG:IED1::LD1/XCBR1.Pos.stVal}}; y = {{TAG:Bay10::LD1/X.y}}"
        );
        assert_eq!(tokens.script("other").unwrap(), "z = {{TAG:IED9::LD1/X.y}}");
    }

    #[test]
    fn test_report() {
        let mut report = RenameReport::new("Bay1", "IED1");
        report.record("subscriptions", Ok(3));
        assert!(report.is_clean());

        report.record("historian", Err(Error::Config("read-only store".to_string())));
        assert!(!report.is_clean());
        assert_eq!(report.step("subscriptions").unwrap().result, Ok(3));
        assert!(report.step("historian").unwrap().result.is_err());
        report.log();
    }
}
