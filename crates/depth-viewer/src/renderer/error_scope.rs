//! Post-hoc GPU error checks around a rendering step.

/// Captures validation and out-of-memory errors raised between `push` and
/// `finish`. Scopes nest; finish them in reverse order.
#[must_use = "an unfinished scope swallows errors from later steps"]
pub struct ErrorScope<'a> {
    device: &'a wgpu::Device,
    stage: &'static str,
}

impl<'a> ErrorScope<'a> {
    pub fn push(device: &'a wgpu::Device, stage: &'static str) -> Self {
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        Self { device, stage }
    }

    /// Pops the scope and returns the first error it captured.
    pub fn finish(self) -> Option<wgpu::Error> {
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        validation.or(oom)
    }

    /// Pops the scope and logs what it captured. Returns `true` when clean.
    pub fn finish_and_log(self) -> bool {
        let stage = self.stage;
        match self.finish() {
            None => true,
            Some(err) => {
                log::error!("GPU error during {}: {}", stage, err);
                false
            }
        }
    }
}
