//! Variable store and recursive reference expansion.
//!
//! Values are stored raw and expanded on demand: `$(name)` substitutes the
//! named value after expanding it in turn, `$x` is the one-character form,
//! and unmapped names expand to nothing. Each mapping remembers the line it
//! was defined on so diagnostics point at the definition site rather than
//! the use site.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Line number for built-in mappings; real lines start at 1.
pub const BUILTIN_LINE: usize = 0;

/// Fatal expansion failures. The `Display` output is the diagnostic line
/// minus the file path, which the parser prefixes.
#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("{line}: *** unterminated variable reference.  Stop.")]
    Unterminated { line: usize },

    #[error("{line}: *** Recursive variable '{name}' references itself (eventually).  Stop.")]
    Recursive { name: String, line: usize },
}

/// Name → raw value mapping with defining-line bookkeeping.
///
/// Cloning produces a scoped extension: recipe expansion clones the parsed
/// store and layers the automatic variables on top without touching it.
#[derive(Clone, Debug)]
pub struct VarStore {
    values: HashMap<String, String>,
    lines: HashMap<String, usize>,
}

impl VarStore {
    /// A store holding the single built-in mapping `$` → `$`, which is what
    /// makes `$$` expand to a literal dollar sign.
    pub fn new() -> Self {
        let mut store = Self {
            values: HashMap::new(),
            lines: HashMap::new(),
        };
        store.define("$", "$", BUILTIN_LINE);
        store
    }

    /// Store or overwrite a mapping. Empty names and empty values are legal
    /// here; the parser rejects empty resolved names itself.
    pub fn define(&mut self, name: &str, value: &str, line: usize) {
        self.values.insert(name.to_string(), value.to_string());
        self.lines.insert(name.to_string(), line);
    }

    /// Expand every variable reference in `input`.
    ///
    /// `line` is the line being expanded and only feeds diagnostics; nested
    /// expansion switches to the defining line of each substituted variable.
    pub fn expand(&self, input: &str, line: usize) -> Result<String, ExpandError> {
        let mut expanding = HashSet::new();
        self.expand_inner(input, line, &mut expanding)
    }

    fn expand_inner(
        &self,
        input: &str,
        line: usize,
        expanding: &mut HashSet<String>,
    ) -> Result<String, ExpandError> {
        let mut out = String::new();
        let mut rest = input;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];

            let Some(next) = rest.chars().next() else {
                // A trailing `$` is a literal.
                out.push('$');
                break;
            };

            if next == '(' {
                let Some(end) = rest[1..].find(')') else {
                    return Err(ExpandError::Unterminated { line });
                };
                let name = &rest[1..1 + end];
                rest = &rest[1 + end + 1..];
                self.substitute(name, expanding, &mut out)?;
            } else {
                // One-character reference. Whitespace names are never mapped,
                // so `$` followed by whitespace contributes nothing.
                let len = next.len_utf8();
                let name = &rest[..len];
                rest = &rest[len..];
                self.substitute(name, expanding, &mut out)?;
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    fn substitute(
        &self,
        name: &str,
        expanding: &mut HashSet<String>,
        out: &mut String,
    ) -> Result<(), ExpandError> {
        let Some(value) = self.values.get(name) else {
            return Ok(());
        };
        let def_line = self.lines.get(name).copied().unwrap_or(BUILTIN_LINE);

        if !expanding.insert(name.to_string()) {
            return Err(ExpandError::Recursive {
                name: name.to_string(),
                line: def_line,
            });
        }
        let expanded = self.expand_inner(value, def_line, expanding)?;
        expanding.remove(name);

        out.push_str(&expanded);
        Ok(())
    }
}
