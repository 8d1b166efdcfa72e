mod run;
mod scheduler;
mod vu;

pub use run::{RunController, RunResult};
pub use scheduler::StageScheduler;
pub use vu::{VuContext, VuState, VuStateCell, run_vu};
