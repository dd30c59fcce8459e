pub mod compare;
pub mod pipeline;
pub mod target;
pub mod validator;

pub use compare::{compare_states, values_equal, DiscrepancyReport, TypeMismatch, ValueMismatch};
pub use pipeline::{token_record, RawTreePipeline, SyncPipeline, TokenModelPipeline};
pub use target::{sync_records, Checkpoint, MemoryTarget, TargetRecord, TargetSystem};
pub use validator::{CutoverPolicy, DualRunValidator, PipelineChoice, ValidationOutcome};
