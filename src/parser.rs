//! Rule-file parsing into the target model.
//!
//! A single pass over physical lines with no look-ahead. Each line is
//! classified as no-op, recipe, variable assignment, or rule header;
//! anything else is a syntax error. The result is the read-only model the
//! rest of the build queries: prerequisites, recipes, and recipe line
//! numbers per target, plus the variable store the recipes expand against.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::vars::{BUILTIN_LINE, ExpandError, VarStore};

/// Fatal parse failures. The `Display` output is the complete diagnostic
/// line; callers print it verbatim.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("tenon: {path}: No such file or directory")]
    Open { path: String },

    #[error("{path}:{line}: *** recipe commences before first target.  Stop.")]
    RecipeBeforeTarget { path: String, line: usize },

    #[error("{path}:{line}: *** empty variable name.  Stop.")]
    EmptyVariableName { path: String, line: usize },

    #[error("{path}:{line}: *** missing target.  Stop.")]
    MissingTarget { path: String, line: usize },

    #[error("{path}:{line}: *** missing separator.  Stop.")]
    MissingSeparator { path: String, line: usize },

    #[error("{path}:{source}")]
    Expand {
        path: String,
        #[source]
        source: ExpandError,
    },
}

/// How one physical line participates in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    NoOp,
    Recipe,
    Assign,
    Rule,
    Invalid,
}

/// Classify a comment-stripped line. Order matters: blank lines win over
/// everything, a tab-initial line is a recipe (or an error outside a rule)
/// even when it contains `=` or `:`, and only then do the separators decide
/// between assignment and rule header.
fn classify(line: &str, rule_active: bool) -> LineKind {
    if trim(line).is_empty() {
        return LineKind::NoOp;
    }
    if line.starts_with('\t') {
        return if rule_active {
            LineKind::Recipe
        } else {
            LineKind::Invalid
        };
    }
    match (line.find('='), line.find(':')) {
        (Some(eq), Some(colon)) if eq < colon => LineKind::Assign,
        (Some(_), Some(_)) => LineKind::Rule,
        (Some(_), None) => LineKind::Assign,
        (None, Some(_)) => LineKind::Rule,
        (None, None) => LineKind::Invalid,
    }
}

/// Discard everything from the first `#` not preceded by a backslash.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'#' && (i == 0 || bytes[i - 1] != b'\\') {
            return &line[..i];
        }
    }
    line
}

/// Strip leading and trailing spaces and tabs, preserving interior runs.
fn trim(s: &str) -> &str {
    s.trim_matches([' ', '\t'])
}

/// The parsed target model: every target named by a rule header has a
/// prerequisite entry (possibly empty), and `recipes`/`recipe_lines` are
/// always the same length for a given target. Read-only once parsing
/// finishes.
#[derive(Debug)]
pub struct Rulefile {
    path: PathBuf,
    prereqs: HashMap<String, Vec<String>>,
    recipes: HashMap<String, Vec<String>>,
    recipe_lines: HashMap<String, Vec<usize>>,
    first_targets: Vec<String>,
    vars: VarStore,
}

impl Rulefile {
    /// Read and parse a rule file from disk.
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path).map_err(|_| ParseError::Open {
            path: path.display().to_string(),
        })?;
        Self::parse_lines(path, text.lines())
    }

    /// Parse a sequence of raw lines. This is the whole parsed-line
    /// contract; `load` is a thin reader in front of it.
    pub fn parse_lines<I, S>(path: impl AsRef<Path>, lines: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut model = Self {
            path: path.as_ref().to_path_buf(),
            prereqs: HashMap::new(),
            recipes: HashMap::new(),
            recipe_lines: HashMap::new(),
            first_targets: Vec::new(),
            vars: VarStore::new(),
        };

        // The rule currently in scope for recipe lines, and the line its
        // header appeared on.
        let mut active_targets: Vec<String> = Vec::new();
        let mut active_line = 0usize;

        for (idx, raw) in lines.into_iter().enumerate() {
            let lineno = idx + 1;
            let line = strip_comment(raw.as_ref());

            match classify(line, !active_targets.is_empty()) {
                LineKind::NoOp => continue,
                LineKind::Recipe => {
                    model.push_recipe(trim(line), lineno, &active_targets, active_line);
                }
                LineKind::Assign => {
                    // An assignment ends the rule in scope.
                    active_targets.clear();
                    model.define_variable(trim(line), lineno)?;
                }
                LineKind::Rule => {
                    active_targets = model.add_rule(trim(line), lineno)?;
                    active_line = lineno;
                }
                LineKind::Invalid => {
                    return Err(if line.starts_with('\t') {
                        ParseError::RecipeBeforeTarget {
                            path: model.path_str(),
                            line: lineno,
                        }
                    } else {
                        ParseError::MissingSeparator {
                            path: model.path_str(),
                            line: lineno,
                        }
                    });
                }
            }
        }

        Ok(model)
    }

    /// Split at the first `=`, resolve the name side (names may themselves
    /// be built from variables), and record the value unexpanded.
    fn define_variable(&mut self, line: &str, lineno: usize) -> Result<(), ParseError> {
        let eq = line.find('=').expect("assignment line contains '='");

        let name = self
            .vars
            .expand(&line[..eq], lineno)
            .map_err(|source| self.expand_error(source))?;
        let name = trim(&name);
        if name.is_empty() {
            return Err(ParseError::EmptyVariableName {
                path: self.path_str(),
                line: lineno,
            });
        }

        let value = trim(&line[eq + 1..]);
        self.vars.define(name, value, lineno);
        Ok(())
    }

    /// Split at the first `:`, resolving each side before re-splitting:
    /// expansion can itself introduce colons, so the separator position is
    /// only trustworthy on the raw line. Returns the header's targets,
    /// which become the rule in scope.
    fn add_rule(&mut self, line: &str, lineno: usize) -> Result<Vec<String>, ParseError> {
        let colon = line.find(':').expect("rule line contains ':'");

        let target_part = self
            .vars
            .expand(&line[..colon], lineno)
            .map_err(|source| self.expand_error(source))?;
        let prereq_part = self
            .vars
            .expand(&line[colon + 1..], lineno)
            .map_err(|source| self.expand_error(source))?;

        let targets: Vec<String> = target_part.split_whitespace().map(str::to_string).collect();
        if targets.is_empty() {
            return Err(ParseError::MissingTarget {
                path: self.path_str(),
                line: lineno,
            });
        }

        // Accumulate prerequisites into each target's entry, first
        // occurrence wins. Targets keep an entry even with no
        // prerequisites: the key set is the set of known targets.
        let new_prereqs: Vec<&str> = prereq_part.split_whitespace().collect();
        for target in &targets {
            let entry = self.prereqs.entry(target.clone()).or_default();
            for prereq in &new_prereqs {
                if !entry.iter().any(|have| have == prereq) {
                    entry.push((*prereq).to_string());
                }
            }
        }

        if self.first_targets.is_empty() {
            self.first_targets = targets.clone();
        }
        Ok(targets)
    }

    /// Attach a recipe line to every target of the rule in scope.
    fn push_recipe(
        &mut self,
        recipe: &str,
        lineno: usize,
        active_targets: &[String],
        active_line: usize,
    ) {
        for target in active_targets {
            // A recipe for a target that already has recipes from an
            // earlier rule header is a redefinition: warn, then clear the
            // recipe storage of every target, not just this one.
            if let Some(&first) = self
                .recipe_lines
                .get(target)
                .and_then(|lines| lines.first())
            {
                if first < active_line {
                    eprintln!(
                        "{}:{}: warning: overriding recipe for target '{}'",
                        self.path.display(),
                        lineno,
                        target
                    );
                    eprintln!(
                        "{}:{}: warning: ignoring old recipe for target '{}'",
                        self.path.display(),
                        first,
                        target
                    );
                    self.recipes.clear();
                    self.recipe_lines.clear();
                }
            }

            self.recipes
                .entry(target.clone())
                .or_default()
                .push(recipe.to_string());
            self.recipe_lines
                .entry(target.clone())
                .or_default()
                .push(lineno);
        }
    }

    /// Path of the rule file this model was parsed from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Targets of the first rule header, empty if the file has no rules.
    pub fn first_targets(&self) -> &[String] {
        &self.first_targets
    }

    /// Prerequisites of `name`, or `None` when no rule header ever named it.
    pub fn prereqs_of(&self, name: &str) -> Option<&[String]> {
        self.prereqs.get(name).map(Vec::as_slice)
    }

    /// Expand the recipes of `target` against a clone of the store with the
    /// automatic variables layered in: `@` is the target name, and when the
    /// prerequisite list is non-empty `<` is its first entry and `^` the
    /// whole list space-joined. Returns the expanded recipes paired with
    /// their source line numbers; a target with no recipes yields empty
    /// vectors.
    pub fn expanded_recipes(&self, target: &str) -> Result<(Vec<String>, Vec<usize>), ParseError> {
        let Some(raw) = self.recipes.get(target) else {
            return Ok((Vec::new(), Vec::new()));
        };
        let lines = self
            .recipe_lines
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let vars = self.recipe_vars(target);
        let mut expanded = Vec::with_capacity(raw.len());
        for (recipe, &line) in raw.iter().zip(lines) {
            let subbed = vars
                .expand(recipe, line)
                .map_err(|source| self.expand_error(source))?;
            expanded.push(subbed);
        }
        Ok((expanded, lines.to_vec()))
    }

    fn recipe_vars(&self, target: &str) -> VarStore {
        let mut vars = self.vars.clone();
        vars.define("@", target, BUILTIN_LINE);
        if let Some(prereqs) = self.prereqs.get(target) {
            if let Some(first) = prereqs.first() {
                vars.define("<", first, BUILTIN_LINE);
                vars.define("^", &prereqs.join(" "), BUILTIN_LINE);
            }
        }
        vars
    }

    fn path_str(&self) -> String {
        self.path.display().to_string()
    }

    fn expand_error(&self, source: ExpandError) -> ParseError {
        ParseError::Expand {
            path: self.path_str(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> Rulefile {
        Rulefile::parse_lines("test.mk", lines).unwrap()
    }

    fn parse_err(lines: &[&str]) -> ParseError {
        Rulefile::parse_lines("test.mk", lines).unwrap_err()
    }

    #[test]
    fn classifies_whitespace_and_separators() {
        assert_eq!(classify("\t", true), LineKind::NoOp);
        assert_eq!(classify(" ", false), LineKind::NoOp);
        assert_eq!(classify("\t", false), LineKind::NoOp);
        assert_eq!(classify("    X = 1", true), LineKind::Assign);
        assert_eq!(classify("    X = 1", false), LineKind::Assign);
        assert_eq!(classify("\tX = 1", true), LineKind::Recipe);
        assert_eq!(classify("\tX = 1", false), LineKind::Invalid);
        assert_eq!(classify("out : in", false), LineKind::Rule);
        assert_eq!(classify("plain words", false), LineKind::Invalid);
    }

    #[test]
    fn assignment_wins_when_equals_precedes_colon() {
        assert_eq!(classify("A = b : c", false), LineKind::Assign);
        assert_eq!(classify("a : b = c", false), LineKind::Rule);
    }

    #[test]
    fn comments_are_stripped() {
        let model = parse(&["A = 1 # trailing", "# whole line", "t :", "\techo $(A)"]);
        let (recipes, _) = model.expanded_recipes("t").unwrap();
        assert_eq!(recipes, vec!["echo 1"]);
    }

    #[test]
    fn escaped_hash_does_not_start_a_comment() {
        let model = parse(&[r"A = a\#b", "t :", "\techo $(A)"]);
        let (recipes, _) = model.expanded_recipes("t").unwrap();
        assert_eq!(recipes, vec![r"echo a\#b"]);
    }

    #[test]
    fn variable_names_may_be_composed_from_variables() {
        let model = parse(&["A = B", "$(A) = c", "t :", "\techo $(B)"]);
        let (recipes, _) = model.expanded_recipes("t").unwrap();
        assert_eq!(recipes, vec!["echo c"]);
    }

    #[test]
    fn values_expand_at_recipe_time_not_assignment_time() {
        let model = parse(&["VAL = $(LATE)", "LATE = yes", "t :", "\techo $(VAL)"]);
        let (recipes, lines) = model.expanded_recipes("t").unwrap();
        assert_eq!(recipes, vec!["echo yes"]);
        assert_eq!(lines, vec![4]);
    }

    #[test]
    fn empty_resolved_variable_name_is_fatal() {
        let err = parse_err(&[" = x"]);
        assert!(matches!(err, ParseError::EmptyVariableName { line: 1, .. }));
        let err = parse_err(&["$(UNSET) = x"]);
        assert!(matches!(err, ParseError::EmptyVariableName { line: 1, .. }));
    }

    #[test]
    fn line_without_separator_is_fatal() {
        let err = parse_err(&["t :", "plain words"]);
        assert!(matches!(err, ParseError::MissingSeparator { line: 2, .. }));
        assert_eq!(
            err.to_string(),
            "test.mk:2: *** missing separator.  Stop."
        );
    }

    #[test]
    fn recipe_outside_a_rule_is_fatal() {
        let err = parse_err(&["\techo hi"]);
        assert!(matches!(err, ParseError::RecipeBeforeTarget { line: 1, .. }));
    }

    #[test]
    fn assignment_ends_the_rule_in_scope() {
        let err = parse_err(&["t :", "X = 1", "\techo hi"]);
        assert!(matches!(err, ParseError::RecipeBeforeTarget { line: 3, .. }));
    }

    #[test]
    fn blank_lines_keep_the_rule_in_scope() {
        let model = parse(&["t :", "", "\techo hi"]);
        let (recipes, _) = model.expanded_recipes("t").unwrap();
        assert_eq!(recipes, vec!["echo hi"]);
    }

    #[test]
    fn empty_target_list_is_fatal() {
        let err = parse_err(&[" : p"]);
        assert!(matches!(err, ParseError::MissingTarget { line: 1, .. }));
    }

    #[test]
    fn prerequisites_accumulate_in_declaration_order() {
        let model = parse(&["t : b", "t : a b", "a :", "b :"]);
        assert_eq!(model.prereqs_of("t").unwrap(), ["b", "a"]);
    }

    #[test]
    fn duplicate_prerequisites_in_one_header_collapse() {
        let model = parse(&["t : p1 p2 p2", "p1 :", "p2 :"]);
        assert_eq!(model.prereqs_of("t").unwrap(), ["p1", "p2"]);
    }

    #[test]
    fn prerequisite_sides_expand_before_splitting() {
        let model = parse(&["P = p1 p2", "t : $(P)", "p1 :", "p2 :"]);
        assert_eq!(model.prereqs_of("t").unwrap(), ["p1", "p2"]);
    }

    #[test]
    fn first_rule_targets_are_remembered_once() {
        let model = parse(&["a b :", "c :"]);
        assert_eq!(model.first_targets(), ["a", "b"]);
    }

    #[test]
    fn rule_header_targets_always_get_an_entry() {
        let model = parse(&["t :"]);
        assert!(model.prereqs_of("t").unwrap().is_empty());
        assert!(model.prereqs_of("u").is_none());
    }

    #[test]
    fn recipes_attach_to_every_target_of_the_header() {
        let model = parse(&["a b :", "\tcc -o $@"]);
        let (recipes_a, _) = model.expanded_recipes("a").unwrap();
        let (recipes_b, _) = model.expanded_recipes("b").unwrap();
        assert_eq!(recipes_a, vec!["cc -o a"]);
        assert_eq!(recipes_b, vec!["cc -o b"]);
    }

    #[test]
    fn recipes_within_one_rule_append() {
        let model = parse(&["t :", "\tfirst", "\tsecond"]);
        let (recipes, lines) = model.expanded_recipes("t").unwrap();
        assert_eq!(recipes, vec!["first", "second"]);
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn override_resets_all_recipe_storage() {
        let model = parse(&[
            "a :",
            "\told_a",
            "b :",
            "\tkept_b",
            "a :",
            "\tnew_a",
        ]);
        let (recipes_a, lines_a) = model.expanded_recipes("a").unwrap();
        assert_eq!(recipes_a, vec!["new_a"]);
        assert_eq!(lines_a, vec![6]);
        // The reset wipes every target's recipes, not only the overridden one.
        let (recipes_b, _) = model.expanded_recipes("b").unwrap();
        assert_eq!(recipes_b, Vec::<String>::new());
    }

    #[test]
    fn automatic_variables_expand_from_the_stored_prerequisites() {
        let model = parse(&["t : p1 p2 p2", "\t$@ $< $^", "p1 :", "p2 :"]);
        let (recipes, _) = model.expanded_recipes("t").unwrap();
        assert_eq!(recipes, vec!["t p1 p1 p2"]);
    }

    #[test]
    fn automatic_variables_without_prerequisites_expand_empty() {
        let model = parse(&["t :", "\t[$@][$<][$^]"]);
        let (recipes, _) = model.expanded_recipes("t").unwrap();
        assert_eq!(recipes, vec!["[t][][]"]);
    }

    #[test]
    fn unknown_target_has_no_recipes() {
        let model = parse(&["t :"]);
        let (recipes, lines) = model.expanded_recipes("absent").unwrap();
        assert!(recipes.is_empty());
        assert!(lines.is_empty());
    }

    #[test]
    fn recipe_expansion_error_carries_path_and_defining_line() {
        let model = parse(&["A = $(A)", "t :", "\techo $(A)"]);
        let err = model.expanded_recipes("t").unwrap_err();
        assert_eq!(
            err.to_string(),
            "test.mk:1: *** Recursive variable 'A' references itself (eventually).  Stop."
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Rulefile::load(Path::new("does/not/exist.mk")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tenon: does/not/exist.mk: No such file or directory"
        );
    }
}
