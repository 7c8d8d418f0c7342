// SimdConfig — Hardware vector capability descriptor
//
// The lane width of bulk kernels depends on the widest vector register the
// CPU offers. Instead of a hidden global, the width is captured once in a
// small Copy value and handed to every Storage at construction. Kernels then
// block their loops by `lanes(dtype)` so the compiler can map each block onto
// one vector register.

/// Widest usable SIMD register, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimdConfig {
    vector_bytes: usize,
}

impl SimdConfig {
    /// Probe the running CPU.
    pub fn detect() -> Self {
        let vector_bytes = detect_vector_bytes();
        log::debug!("detected SIMD vector width: {} bytes", vector_bytes);
        SimdConfig { vector_bytes }
    }

    /// Use an explicit register width (rounded up to at least one byte).
    pub fn with_vector_bytes(vector_bytes: usize) -> Self {
        SimdConfig {
            vector_bytes: vector_bytes.max(1),
        }
    }

    /// Scalar-only configuration: every kind gets exactly one lane.
    pub fn scalar() -> Self {
        Self::with_vector_bytes(1)
    }

    pub fn vector_bytes(&self) -> usize {
        self.vector_bytes
    }

    /// Lanes for an element of `byte_count` bytes.
    pub fn lanes_for(&self, byte_count: usize) -> usize {
        (self.vector_bytes / byte_count.max(1)).max(1)
    }
}

impl Default for SimdConfig {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_vector_bytes() -> usize {
    if std::is_x86_feature_detected!("avx512f") {
        64
    } else if std::is_x86_feature_detected!("avx2") {
        32
    } else {
        16
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn detect_vector_bytes() -> usize {
    // NEON and most other targets expose 128-bit registers
    16
}
