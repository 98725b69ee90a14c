mod error;
pub use error::{AggregatedErrors, ConfigError, Errors};

mod id;
pub use id::StepId;

mod executor;
pub use executor::ExecutorKind;

mod qsub;
pub use qsub::{QsubOverrides, QsubParams};

mod params;
pub use params::{CondaParams, GlobalParams, ParamFile, Scope, StepDef};

mod context;
pub use context::{Collision, DataContext, PROJECT_UNIT};

mod pipeline;
pub use pipeline::Pipeline;

/// Poll interval (seconds) used by generated wait loops when `Default_wait` isn't set.
pub const DEFAULT_POLL_INTERVAL: u64 = 10;
