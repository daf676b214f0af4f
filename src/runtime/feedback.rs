//! Output/feedback sink
//!
//! Fire-and-forget: delivery never blocks the dispatch loop and never
//! reports back.

use crate::types::PlanResult;
use colored::Colorize;
use std::sync::Mutex;

/// Something to show or speak to the user
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// Result of one dispatched utterance
    Plan { utterance: String, plan: PlanResult },
    /// Informational message outside a plan (e.g. an interrupt)
    Notice(String),
    /// Turn-level failure, such as lost input
    Error(String),
}

pub trait FeedbackSink: Send + Sync {
    fn deliver(&self, feedback: Feedback);
}

/// Colored terminal output
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    /// Print every request outcome, not just the summary
    pub detailed: bool,
}

impl ConsoleSink {
    pub fn new(detailed: bool) -> Self {
        Self { detailed }
    }
}

impl FeedbackSink for ConsoleSink {
    fn deliver(&self, feedback: Feedback) {
        match feedback {
            Feedback::Plan { plan, .. } => {
                if self.detailed || plan.len() > 1 {
                    for outcome in plan.outcomes() {
                        let mark = if outcome.ok { "✓".green() } else { "✗".red() };
                        println!("  {} {} {}", mark, outcome.request.action_type().cyan(), outcome.message);
                    }
                }
                let summary = plan.summary();
                if plan.overall_ok() {
                    println!("{}", summary.green());
                } else {
                    println!("{}", summary.yellow());
                }
            }
            Feedback::Notice(message) => println!("{}", message.blue()),
            Feedback::Error(message) => eprintln!("{} {}", "error:".red().bold(), message),
        }
    }
}

/// Keeps every delivery in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    items: Mutex<Vec<Feedback>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything delivered so far
    pub fn take(&self) -> Vec<Feedback> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(|p| p.into_inner()))
    }

    /// Plans delivered so far, in order
    pub fn plans(&self) -> Vec<PlanResult> {
        self.items
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter_map(|f| match f {
                Feedback::Plan { plan, .. } => Some(plan.clone()),
                _ => None,
            })
            .collect()
    }
}

impl FeedbackSink for CollectingSink {
    fn deliver(&self, feedback: Feedback) {
        self.items.lock().unwrap_or_else(|p| p.into_inner()).push(feedback);
    }
}
