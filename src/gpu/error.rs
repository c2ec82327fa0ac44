use thiserror::Error;

/// GPUドライバエラー
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("GPU driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("Out of device memory: requested {requested} bytes")]
    OutOfMemory { requested: u64 },

    #[error("GPU driver error: {0}")]
    Driver(String),
}

pub type GpuResult<T> = Result<T, GpuError>;
