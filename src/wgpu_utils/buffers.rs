//! Typed uniform, storage and staging buffers
use std::marker::PhantomData;

use crate::error::{SimResult, SimulationError};

fn short_type_name<Content>() -> &'static str {
    let type_name = std::any::type_name::<Content>();
    match type_name.rfind(':') {
        Some(pos) => &type_name[(pos + 1)..],
        None => type_name,
    }
}

/// Uniform buffer holding a single `Content`
pub struct UniformBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    previous_content: Vec<u8>,
}

impl<Content: bytemuck::Pod> UniformBuffer<Content> {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("UniformBuffer: {}", short_type_name::<Content>())),
            size: std::mem::size_of::<Content>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        UniformBuffer {
            buffer,
            content_type: PhantomData,
            previous_content: Vec::new(),
        }
    }

    /// Write `content`, skipping the upload when it is unchanged
    pub fn update_content(&mut self, queue: &wgpu::Queue, content: Content) {
        let new_content = bytemuck::bytes_of(&content);
        if self.previous_content == new_content {
            return;
        }
        queue.write_buffer(&self.buffer, 0, new_content);
        self.previous_content = new_content.to_vec();
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }
}

/// Fixed-capacity array of `Content` on the device
pub struct ArrayBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    capacity: usize,
}

impl<Content: bytemuck::Pod> ArrayBuffer<Content> {
    fn byte_len(capacity: usize) -> u64 {
        (capacity * std::mem::size_of::<Content>()) as u64
    }

    /// Storage buffer; writable buffers can also be copied from
    pub fn new(device: &wgpu::Device, capacity: usize, read_only: bool) -> Self {
        let usage = if read_only {
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
        } else {
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC
        };

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("ArrayBuffer<{}>", short_type_name::<Content>())),
            size: Self::byte_len(capacity),
            usage,
            mapped_at_creation: false,
        });

        ArrayBuffer {
            buffer,
            content_type: PhantomData,
            capacity,
        }
    }

    /// Host-mappable buffer for reading results back
    pub fn new_staging(device: &wgpu::Device, capacity: usize) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("StagingBuffer<{}>", short_type_name::<Content>())),
            size: Self::byte_len(capacity),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        ArrayBuffer {
            buffer,
            content_type: PhantomData,
            capacity,
        }
    }

    /// Upload exactly `capacity` elements
    pub fn write(&self, queue: &wgpu::Queue, data: &[Content]) -> SimResult<()> {
        if data.len() != self.capacity {
            return Err(SimulationError::LengthMismatch {
                what: "device array",
                expected: self.capacity,
                found: data.len(),
            });
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        Ok(())
    }

    /// Record a full copy of `self` into `target`
    pub fn copy_to(&self, encoder: &mut wgpu::CommandEncoder, target: &ArrayBuffer<Content>) {
        let size = Self::byte_len(self.capacity.min(target.capacity));
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &target.buffer, 0, size);
    }

    /// Map a staging buffer and copy its contents out (blocking)
    pub fn read_mapped(&self, device: &wgpu::Device) -> SimResult<Vec<Content>> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| SimulationError::Readback(e.to_string()))?;

        match futures::executor::block_on(rx) {
            Ok(Ok(())) => {
                let mapped = slice.get_mapped_range();
                let result: Vec<Content> = bytemuck::cast_slice(&mapped).to_vec();
                drop(mapped);
                self.buffer.unmap();
                Ok(result)
            }
            Ok(Err(e)) => Err(SimulationError::Readback(e.to_string())),
            Err(_) => Err(SimulationError::Readback(
                "map callback dropped before completion".to_string(),
            )),
        }
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Sample>(), "Sample");
        assert_eq!(short_type_name::<u32>(), "u32");
    }
}
