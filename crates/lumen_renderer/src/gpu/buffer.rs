use std::marker::PhantomData;

use bytemuck::Pod;
use thiserror::Error;
use wgpu::util::DeviceExt;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error(
        "buffer '{label}' holds {capacity} elements, cannot write {requested} at offset {offset}"
    )]
    Overflow {
        label: String,
        capacity: u64,
        offset: u64,
        requested: u64,
    },
}

/// A `wgpu::Buffer` holding up to `capacity` values of `T`.
///
/// Writes are typed and bounds-checked; the buffer is released when this is
/// dropped.
#[derive(Debug)]
pub struct GpuBuffer<T: Pod> {
    buffer: wgpu::Buffer,
    capacity: u64,
    label: String,
    _marker: PhantomData<T>,
}

impl<T: Pod> GpuBuffer<T> {
    /// Zero-initialized buffer. At least one element is allocated since
    /// zero-sized bindings are invalid.
    pub fn new(device: &wgpu::Device, label: &str, capacity: u64, usage: wgpu::BufferUsages) -> Self {
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity * std::mem::size_of::<T>() as u64,
            usage,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            capacity,
            label: label.to_owned(),
            _marker: PhantomData,
        }
    }

    pub fn with_data(
        device: &wgpu::Device,
        label: &str,
        data: &[T],
        usage: wgpu::BufferUsages,
    ) -> Self {
        if data.is_empty() {
            return Self::new(device, label, 1, usage);
        }
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage,
        });
        Self {
            buffer,
            capacity: data.len() as u64,
            label: label.to_owned(),
            _marker: PhantomData,
        }
    }

    /// Queues a write of `data` starting at element `offset`.
    pub fn write(&self, queue: &wgpu::Queue, offset: u64, data: &[T]) -> Result<(), BufferError> {
        check_write(&self.label, self.capacity, offset, data.len() as u64)?;
        if !data.is_empty() {
            let byte_offset = offset * std::mem::size_of::<T>() as u64;
            queue.write_buffer(&self.buffer, byte_offset, bytemuck::cast_slice(data));
        }
        Ok(())
    }

    pub fn write_one(&self, queue: &wgpu::Queue, value: &T) -> Result<(), BufferError> {
        self.write(queue, 0, std::slice::from_ref(value))
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

fn check_write(label: &str, capacity: u64, offset: u64, requested: u64) -> Result<(), BufferError> {
    match offset.checked_add(requested) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(BufferError::Overflow {
            label: label.to_owned(),
            capacity,
            offset,
            requested,
        }),
    }
}
