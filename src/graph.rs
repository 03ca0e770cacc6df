//! Generic concurrent task-graph execution.
//!
//! A task is a name, the names of the tasks it depends on, and an opaque
//! work function — nothing here knows about rule files or recipes. Work
//! functions run on a fixed pool of worker threads fed over a job channel;
//! the scheduling thread owns every piece of bookkeeping (ready queue,
//! blocking counts, child adjacency) so none of it needs locks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, mpsc};
use std::thread;

/// Work function for one task. Receives the task's own name and must be
/// safe to run concurrently with other tasks' work functions.
pub type TaskFn = Box<dyn Fn(&str) -> bool + Send + 'static>;

/// A named unit of work and the names of the tasks that must finish first.
/// Parents absent from the submitted set are ignored.
pub struct Task {
    pub name: String,
    pub parents: Vec<String>,
    pub run: TaskFn,
}

/// A dispatched unit handed to a worker thread.
struct Job {
    idx: usize,
    name: String,
    run: TaskFn,
}

/// Run every task after its parents, with at most `jobs` in flight at once.
///
/// Duplicate names keep the first task seen. The first failure stops new
/// launches; tasks already in flight finish first. Returns true only when
/// every distinct task ran to completion and reported success — tasks that
/// never become ready (a dependency cycle among the submitted tasks) make
/// the run fail even though no work function reported failure.
pub fn run(tasks: Vec<Task>, jobs: usize) -> bool {
    let workers = jobs.max(1);

    // Deduplicate by name, first occurrence wins.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Task> = Vec::new();
    for task in tasks {
        if !index.contains_key(&task.name) {
            index.insert(task.name.clone(), unique.len());
            unique.push(task);
        }
    }
    let total = unique.len();
    if total == 0 {
        return true;
    }

    // Blocking counts and child adjacency over present parents only.
    let mut blocked: Vec<usize> = vec![0; total];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); total];
    for (idx, task) in unique.iter().enumerate() {
        for parent in &task.parents {
            if let Some(&parent_idx) = index.get(parent.as_str()) {
                blocked[idx] += 1;
                children[parent_idx].push(idx);
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..total).filter(|&idx| blocked[idx] == 0).collect();

    let mut names: Vec<String> = Vec::with_capacity(total);
    let mut work: Vec<Option<TaskFn>> = Vec::with_capacity(total);
    for task in unique {
        names.push(task.name);
        work.push(Some(task.run));
    }

    let (job_tx, job_rx) = mpsc::channel::<Job>();
    let (result_tx, result_rx) = mpsc::channel::<(usize, bool)>();
    let job_rx = Mutex::new(job_rx);
    let job_rx_ref = &job_rx;

    thread::scope(|s| {
        for _ in 0..workers {
            let tx = result_tx.clone();
            s.spawn(move || {
                loop {
                    // The channel closing is the shutdown signal.
                    let job = match job_rx_ref.lock().unwrap().recv() {
                        Ok(job) => job,
                        Err(_) => break,
                    };
                    let ok = (job.run)(&job.name);
                    if tx.send((job.idx, ok)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut completed = 0usize;
        let mut in_flight = 0usize;
        let mut failed = false;

        loop {
            // Launch ready tasks while a concurrency slot is free. After a
            // failure nothing new is launched.
            while !failed && in_flight < workers {
                let Some(idx) = ready.pop_front() else {
                    break;
                };
                let Some(run) = work[idx].take() else {
                    continue;
                };
                let job = Job {
                    idx,
                    name: names[idx].clone(),
                    run,
                };
                if job_tx.send(job).is_err() {
                    failed = true;
                    break;
                }
                in_flight += 1;
            }

            // Nothing running and nothing launchable: either every task
            // completed, or the rest can never become ready.
            if in_flight == 0 {
                break;
            }

            match result_rx.recv() {
                Ok((idx, ok)) => {
                    in_flight -= 1;
                    completed += 1;
                    if !ok {
                        failed = true;
                        continue;
                    }
                    for &child in &children[idx] {
                        blocked[child] -= 1;
                        if blocked[child] == 0 {
                            ready.push_back(child);
                        }
                    }
                }
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }

        drop(job_tx);
        !failed && completed == total
    })
}
