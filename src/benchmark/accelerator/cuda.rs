//! cuBLAS SGEMM backend

use cudarc::cublas::sys::cublasOperation_t;
use cudarc::cublas::{CudaBlas, Gemm, GemmConfig};
use cudarc::driver::{CudaDevice, CudaSlice};
use rand::Rng;
use std::sync::Arc;

use super::ComputeRuntime;
use crate::error::ProbeError;

/// Square column-major operands, allocated once per matrix size
struct Operands {
    n: usize,
    host: Vec<f32>,
    a: CudaSlice<f32>,
    b: CudaSlice<f32>,
    c: CudaSlice<f32>,
}

pub struct CublasRuntime {
    device: Arc<CudaDevice>,
    blas: CudaBlas,
    operands: Option<Operands>,
}

impl CublasRuntime {
    pub fn new(ordinal: usize) -> Result<Self, ProbeError> {
        let device = CudaDevice::new(ordinal).map_err(driver_error)?;
        let blas = CudaBlas::new(device.clone())
            .map_err(|err| ProbeError::Runtime(format!("cuBLAS init failed: {err:?}")))?;
        Ok(Self {
            device,
            blas,
            operands: None,
        })
    }

    fn prepare(&mut self, n: usize) -> Result<(), ProbeError> {
        if self.operands.as_ref().is_some_and(|ops| ops.n == n) {
            return Ok(());
        }

        let len = n
            .checked_mul(n)
            .ok_or_else(|| ProbeError::Runtime(format!("matrix size {n} is too large")))?;
        let mut rng = rand::rng();
        let host: Vec<f32> = (0..len).map(|_| rng.random::<f32>() - 0.5).collect();

        let a = self.device.htod_sync_copy(&host).map_err(driver_error)?;
        let b = self.device.htod_sync_copy(&host).map_err(driver_error)?;
        let c = self.device.alloc_zeros::<f32>(len).map_err(driver_error)?;
        self.operands = Some(Operands { n, host, a, b, c });
        Ok(())
    }

    #[cfg(test)]
    fn product(&self) -> Result<Vec<f32>, ProbeError> {
        let ops = self
            .operands
            .as_ref()
            .ok_or_else(|| ProbeError::Runtime("no multiply has run".to_string()))?;
        self.device.dtoh_sync_copy(&ops.c).map_err(driver_error)
    }
}

impl ComputeRuntime for CublasRuntime {
    fn device_name(&self) -> Result<String, ProbeError> {
        self.device.name().map_err(driver_error)
    }

    fn matmul(&mut self, n: usize) -> Result<(), ProbeError> {
        self.prepare(n)?;
        let dim = i32::try_from(n)
            .map_err(|_| ProbeError::Runtime(format!("matrix size {n} is too large")))?;
        let ops = self
            .operands
            .as_mut()
            .ok_or_else(|| ProbeError::Runtime("operands missing".to_string()))?;

        let cfg = GemmConfig {
            transa: cublasOperation_t::CUBLAS_OP_N,
            transb: cublasOperation_t::CUBLAS_OP_N,
            m: dim,
            n: dim,
            k: dim,
            alpha: 1.0f32,
            lda: dim,
            ldb: dim,
            beta: 0.0f32,
            ldc: dim,
        };

        // SAFETY: a, b and c each hold n*n f32 values, matching m/n/k and the leading dimensions
        unsafe { self.blas.gemm(cfg, &ops.a, &ops.b, &mut ops.c) }
            .map_err(|err| ProbeError::Runtime(format!("cuBLAS sgemm failed: {err:?}")))
    }

    fn synchronize(&mut self) -> Result<(), ProbeError> {
        self.device.synchronize().map_err(driver_error)
    }
}

fn driver_error(err: cudarc::driver::DriverError) -> ProbeError {
    ProbeError::Runtime(format!("CUDA driver error: {err:?}"))
}
