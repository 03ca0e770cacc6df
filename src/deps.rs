//! Prerequisite resolution and staleness checks over a parsed rule file.
//!
//! Model errors (unknown targets, unknown prerequisites, dependency cycles)
//! surface here, when a target's prerequisites are looked up — not at parse
//! time. Staleness is a pure modification-time comparison; any I/O
//! uncertainty counts as "must rebuild".

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::time::SystemTime;

use thiserror::Error;

use crate::parser::Rulefile;

/// Fatal model failures raised during prerequisite lookup.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("tenon: *** No rule to make target '{0}'. Stop.")]
    UnknownTarget(String),

    #[error("tenon: *** No rule to make target '{prereq}', needed by '{target}'. Stop.")]
    UnknownPrereq { prereq: String, target: String },

    #[error("tenon: *** Circular dependency for target '{0}'. Stop.")]
    Circular(String),
}

/// Resolve the prerequisites of `target`, validating that the target and
/// every listed prerequisite are known and that no dependency cycle is
/// reachable from the target.
pub fn prereqs(model: &Rulefile, target: &str) -> Result<Vec<String>, ModelError> {
    let Some(prereqs) = model.prereqs_of(target) else {
        return Err(ModelError::UnknownTarget(target.to_string()));
    };

    for prereq in prereqs {
        if model.prereqs_of(prereq).is_none() {
            return Err(ModelError::UnknownPrereq {
                prereq: prereq.clone(),
                target: target.to_string(),
            });
        }
    }

    if has_cycle(model, target) {
        return Err(ModelError::Circular(target.to_string()));
    }

    Ok(prereqs.to_vec())
}

/// Breadth-first scan over prerequisite edges from `target`. Names with no
/// rule entry are leaves. Reaching a name that was already taken off the
/// queue signals a cycle.
fn has_cycle(model: &Rulefile, target: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(target);

    while let Some(current) = queue.pop_front() {
        visited.insert(current);

        for prereq in model.prereqs_of(current).unwrap_or(&[]) {
            if visited.contains(prereq.as_str()) {
                return true;
            }
            queue.push_back(prereq);
        }
    }
    false
}

/// True when `target` must be rebuilt: its file is missing or unreadable,
/// a prerequisite's file is missing or unreadable, or a prerequisite was
/// modified more recently than the target.
pub fn outdated(model: &Rulefile, target: &str) -> bool {
    let Ok(target_time) = modified(target) else {
        return true;
    };

    for prereq in model.prereqs_of(target).unwrap_or(&[]) {
        match modified(prereq) {
            Ok(time) if time <= target_time => {}
            _ => return true,
        }
    }
    false
}

fn modified(path: &str) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}
