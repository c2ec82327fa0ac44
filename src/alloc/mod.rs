// アロケーション管理モジュール
pub mod record;
pub mod registry;

pub use record::{now_epoch, AllocationRecord, RecordState};
pub use registry::{AllocationRegistry, RegistryError, RegistryResult};
