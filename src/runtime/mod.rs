//! Runtime: acquisition, the single-slot queue, feedback and the
//! interruptible turn loop

pub mod acquisition;
pub mod assistant;
pub mod feedback;
pub mod queue;
pub mod run;

pub use acquisition::{Acquired, ScriptedSource, StdinSource, Utterance, UtteranceSource};
pub use assistant::{Assistant, BuildOptions};
pub use feedback::{CollectingSink, ConsoleSink, Feedback, FeedbackSink};
pub use queue::{command_queue, CommandReceiver, CommandSender};
pub use run::{run, RunSummary};
