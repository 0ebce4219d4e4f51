//! A wrapper for WGPU state.
//!
//! The render core draws into offscreen targets, so no surface is required;
//! [`Gpu::headless`] is the usual entry point. An application that already
//! owns its WGPU resources can hand them over with [`Gpu::with_resources`].

use std::sync::Arc;

use crate::error::RenderError;

/// A wrapper for a WGPU instance, adapter, device, and queue.
pub struct Gpu {
    instance: Arc<wgpu::Instance>,
    adapter: Arc<wgpu::Adapter>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl Gpu {
    /// Create a Gpu structure with already-created GPU resources.
    pub fn with_resources(
        instance: Arc<wgpu::Instance>,
        adapter: Arc<wgpu::Adapter>,
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
    ) -> Self {
        Self {
            instance,
            adapter,
            device,
            queue,
        }
    }

    /// Create a Gpu structure by initializing WGPU without a surface.
    pub async fn headless() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

        Ok(Self::with_resources(
            Arc::new(instance),
            Arc::new(adapter),
            Arc::new(device),
            Arc::new(queue),
        ))
    }

    /// Blocking convenience wrapper around [`Gpu::headless`].
    pub fn headless_blocking() -> Result<Self, RenderError> {
        pollster::block_on(Self::headless())
    }

    /// Returns true if this GPU interface is using a GL backend, important
    /// to work around some driver quirks.
    pub fn is_gl(&self) -> bool {
        self.adapter.get_info().backend == wgpu::Backend::Gl
    }

    /// Returns this GPU wrapper's [`wgpu::Instance`].
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    /// Returns this GPU wrapper's [`wgpu::Adapter`].
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Returns this GPU wrapper's [`wgpu::Device`].
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns this GPU wrapper's [`wgpu::Queue`].
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}
