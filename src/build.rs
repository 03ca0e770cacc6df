//! Build orchestration: from requested targets to a scheduled task graph.
//!
//! Each requested target is expanded breadth-first over its prerequisites
//! into one task per reachable name, then handed to the task-graph runner.
//! A task rebuilds its target only when it is outdated, pushing each recipe
//! through the process runner and stopping at the first failure. Requested
//! targets run in sequence; the first one that fails ends the run.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;

use crate::deps;
use crate::graph::{self, Task, TaskFn};
use crate::parser::Rulefile;
use crate::runner::ProcessRunner;
use crate::verbose::{self, Timer, vprintln};

/// Build the requested targets, or the first rule's targets when none are
/// given. Returns `Ok(false)` when a target fails to build (diagnostics
/// were already printed by the failing task); model and parse errors abort
/// the whole request as `Err`.
pub fn run(
    model: Arc<Rulefile>,
    requested: &[String],
    jobs: usize,
    runner: Arc<dyn ProcessRunner>,
) -> Result<bool> {
    let _timer = Timer::start("build");

    let targets: Vec<String> = if requested.is_empty() {
        model.first_targets().to_vec()
    } else {
        requested.to_vec()
    };

    for target in &targets {
        let tasks = taskify(&model, target, &runner)?;
        vprintln!(
            "  task graph for '{}': {} tasks, {} worker(s)",
            target,
            tasks.len(),
            jobs
        );
        if !graph::run(tasks, jobs) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Expand `target` into one task per reachable name, breadth-first over
/// prerequisite edges. Revisited names produce duplicate tasks; the runner
/// keeps the first of each name.
fn taskify(
    model: &Arc<Rulefile>,
    requested: &str,
    runner: &Arc<dyn ProcessRunner>,
) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(requested.to_string());

    while let Some(name) = queue.pop_front() {
        let prereqs = deps::prereqs(model, &name)?;
        tasks.push(Task {
            name,
            parents: prereqs.clone(),
            run: build_task(model, requested, runner),
        });
        queue.extend(prereqs);
    }
    Ok(tasks)
}

/// The work function for one target: skip fresh targets, otherwise expand
/// and execute each recipe in order.
fn build_task(
    model: &Arc<Rulefile>,
    requested: &str,
    runner: &Arc<dyn ProcessRunner>,
) -> TaskFn {
    let model = Arc::clone(model);
    let runner = Arc::clone(runner);
    let requested = requested.to_string();

    Box::new(move |target: &str| {
        if !deps::outdated(&model, target) {
            // Only the target the user asked for gets the notice.
            if target == requested {
                println!("tenon: '{target}' is up to date.");
            }
            return true;
        }

        // Recipes expand here, on the worker, against a disposable store
        // carrying this target's automatic variables.
        let (recipes, lines) = match model.expanded_recipes(target) {
            Ok(pair) => pair,
            Err(err) => {
                eprintln!("{err}");
                return false;
            }
        };

        let path = model.path().display();
        for (recipe, line) in recipes.iter().zip(lines) {
            // A leading `@` suppresses the echo.
            let command = match recipe.strip_prefix('@') {
                Some(rest) => rest,
                None => {
                    if !verbose::is_silent() {
                        println!("{recipe}");
                    }
                    recipe.as_str()
                }
            };

            match runner.run(command) {
                Ok(0) => {}
                Ok(code) => {
                    eprintln!("tenon: *** [{path}:{line}: {target}] Error {code}");
                    return false;
                }
                Err(err) => {
                    eprintln!("tenon: *** [{path}:{line}: {target}] {err}");
                    return false;
                }
            }
        }
        true
    })
}
