//! CUDA driver binding.
//!
//! Allocates pinned device memory through the CUDA VMM API
//! (`cuMemCreate`) and exports every allocation as a fabric handle
//! (`cuMemExportToShareableHandle`) so that an unrelated process on the
//! same host can import it and map the identical physical pages.

use cudarc::driver::result;
use cudarc::driver::sys::{
    cuMemCreate, cuMemExportToShareableHandle, cuMemGetAllocationGranularity, cuMemRelease,
    cudaError_enum::{CUDA_ERROR_OUT_OF_MEMORY, CUDA_SUCCESS},
    CUdevice, CUmemAllocationGranularity_flags,
    CUmemAllocationHandleType_enum::CU_MEM_HANDLE_TYPE_FABRIC, CUmemAllocationProp,
    CUmemAllocationType_enum::CU_MEM_ALLOCATION_TYPE_PINNED, CUmemGenericAllocationHandle,
    CUmemLocation, CUmemLocationType_enum::CU_MEM_LOCATION_TYPE_DEVICE,
};

use super::{FabricHandle, GpuAllocation, GpuBinding, GpuError, GpuResult, FABRIC_HANDLE_SIZE};

macro_rules! cuda_driver_try {
    ($expr:expr, $err:expr) => {{
        let result = unsafe { $expr };
        if result != CUDA_SUCCESS {
            return Err($err(result));
        }
    }};
}

/// Allocation property block for fabric-shareable pinned device memory
fn fabric_alloc_prop(device: CUdevice) -> CUmemAllocationProp {
    CUmemAllocationProp {
        type_: CU_MEM_ALLOCATION_TYPE_PINNED,
        requestedHandleTypes: CU_MEM_HANDLE_TYPE_FABRIC,
        location: CUmemLocation {
            type_: CU_MEM_LOCATION_TYPE_DEVICE,
            id: device,
        },
        win32HandleMetaData: std::ptr::null_mut(),
        allocFlags: Default::default(),
    }
}

fn min_granularity(device: CUdevice) -> GpuResult<u64> {
    let mut granularity: usize = 0;
    let prop = fabric_alloc_prop(device);

    cuda_driver_try!(
        cuMemGetAllocationGranularity(
            &mut granularity,
            &prop,
            CUmemAllocationGranularity_flags::CU_MEM_ALLOC_GRANULARITY_MINIMUM,
        ),
        |r| GpuError::Driver(format!("cuMemGetAllocationGranularity failed: {:?}", r))
    );

    Ok(granularity as u64)
}

/// GPU binding backed by the CUDA driver.
///
/// Holds the target device and the allocation granularity queried at
/// startup. `cuMemCreate` only accepts sizes that are multiples of the
/// granularity, so requested sizes are rounded up internally; callers keep
/// accounting in terms of the requested size.
pub struct CudaBinding {
    device: CUdevice,
    granularity: u64,
}

impl CudaBinding {
    /// Initialize the CUDA driver and bind to the given device ordinal.
    ///
    /// Retains the device's primary context so that later allocation calls
    /// from dispatcher threads find a current context.
    pub fn new(device_ordinal: u32) -> GpuResult<Self> {
        result::init().map_err(|e| GpuError::DriverUnavailable(e.to_string()))?;

        let device = result::device::get(device_ordinal as i32)
            .map_err(|e| GpuError::DriverUnavailable(format!("cuDeviceGet failed: {}", e)))?;

        unsafe {
            let ctx = result::primary_ctx::retain(device)
                .map_err(|e| GpuError::DriverUnavailable(format!("primary ctx: {}", e)))?;
            result::ctx::set_current(ctx)
                .map_err(|e| GpuError::DriverUnavailable(format!("set ctx: {}", e)))?;
        }

        let granularity = min_granularity(device)?;

        tracing::info!(
            device = device_ordinal,
            granularity,
            "CUDA driver initialized"
        );

        Ok(Self {
            device,
            granularity,
        })
    }
}

impl GpuBinding for CudaBinding {
    fn allocate(&self, size: u64) -> GpuResult<GpuAllocation> {
        let padded = size.next_multiple_of(self.granularity);
        let prop = fabric_alloc_prop(self.device);

        let mut handle: CUmemGenericAllocationHandle = 0;
        let create = unsafe { cuMemCreate(&mut handle, padded as usize, &prop, 0) };
        if create != CUDA_SUCCESS {
            if create == CUDA_ERROR_OUT_OF_MEMORY {
                return Err(GpuError::OutOfMemory { requested: size });
            }
            return Err(GpuError::Driver(format!(
                "cuMemCreate({} bytes) failed: {:?}",
                padded, create
            )));
        }

        let mut fabric = [0u8; FABRIC_HANDLE_SIZE];
        let export = unsafe {
            cuMemExportToShareableHandle(
                fabric.as_mut_ptr() as *mut std::ffi::c_void,
                handle,
                CU_MEM_HANDLE_TYPE_FABRIC,
                0,
            )
        };
        if export != CUDA_SUCCESS {
            // Export failed: the physical allocation must not leak
            unsafe { cuMemRelease(handle) };
            return Err(GpuError::Driver(format!(
                "cuMemExportToShareableHandle failed: {:?}",
                export
            )));
        }

        tracing::debug!(size, padded, handle, "allocated device memory");

        Ok(GpuAllocation {
            handle,
            fabric: FabricHandle::from_bytes(fabric),
        })
    }

    fn release(&self, handle: u64) -> GpuResult<()> {
        if handle == 0 {
            return Ok(());
        }

        cuda_driver_try!(cuMemRelease(handle), |r| GpuError::Driver(format!(
            "cuMemRelease failed: {:?}",
            r
        )));

        tracing::debug!(handle, "released device memory");
        Ok(())
    }
}
