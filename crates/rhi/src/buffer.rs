//! Host-visible GPU buffers backed by gpu-allocator.
//!
//! The compositor only needs two kinds: vertex buffers rewritten when the
//! viewport changes, and staging buffers that carry camera planes and the
//! alpha matte into optimal-tiling images.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// What a [`Buffer`] is used for. Decides usage flags and memory location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    /// Transfer source for image uploads.
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Both kinds are written by the CPU every few cycles.
    pub fn memory_location(self) -> MemoryLocation {
        MemoryLocation::CpuToGpu
    }

    /// Allocation name, shown in allocator reports and logs.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Staging => "staging",
        }
    }
}

/// A buffer and its persistently mapped allocation.
///
/// Memory comes from the device's gpu-allocator instance in a `CpuToGpu`
/// location, so writes are plain memory copies with no explicit flush.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use compositor_rhi::buffer::{Buffer, BufferUsage};
/// use compositor_rhi::device::Device;
///
/// # fn example(device: Arc<Device>) -> Result<(), compositor_rhi::RhiError> {
/// let vertices = Buffer::new(device, BufferUsage::Vertex, 64)?;
/// vertices.write_data(0, &[0u8; 64])?;
/// # Ok(())
/// # }
/// ```
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Memory allocation; `None` only while dropping.
    allocation: Option<Allocation>,
    /// Size in bytes.
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer and binds freshly allocated memory to it.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device and its allocator
    /// * `usage` - Vertex data or upload staging
    /// * `size` - Size in bytes, must be non-zero
    ///
    /// # Errors
    ///
    /// Fails for a zero size, or when buffer creation, allocation or binding
    /// fails. The buffer handle is destroyed if allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Copies `data` into the mapped memory at `offset`.
    ///
    /// The GPU must not be reading the written range.
    ///
    /// # Errors
    ///
    /// Returns an error if the write would run past the end of the buffer or the
    /// memory is not mapped.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped = self.mapped_ptr()?;
        unsafe {
            let dst = mapped.add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Copies `rows` rows of `row_len` bytes from a strided source into a
    /// tightly packed region starting at `offset`.
    ///
    /// Camera planes often carry row padding; the staging copy drops it so the
    /// buffer-to-image copy can use a tight row length.
    ///
    /// # Arguments
    ///
    /// * `offset` - Destination offset in bytes
    /// * `src` - Source bytes
    /// * `src_stride` - Bytes between the starts of consecutive source rows
    /// * `row_len` - Bytes to copy from each row
    /// * `rows` - Number of rows
    ///
    /// # Errors
    ///
    /// Returns an error if `src` is shorter than the rows it claims to hold, the
    /// stride is smaller than the row length, or the packed rows do not fit.
    pub fn write_rows(
        &self,
        offset: vk::DeviceSize,
        src: &[u8],
        src_stride: usize,
        row_len: usize,
        rows: usize,
    ) -> RhiResult<()> {
        if rows == 0 || row_len == 0 {
            return Ok(());
        }
        let needed_src = src_stride * (rows - 1) + row_len;
        if src_stride < row_len || src.len() < needed_src {
            return Err(RhiError::InvalidHandle(format!(
                "Source too small: {} bytes for {} rows of {} (stride {})",
                src.len(),
                rows,
                row_len,
                src_stride
            )));
        }
        if offset + (row_len * rows) as vk::DeviceSize > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Row upload of {}x{} exceeds buffer size {}",
                row_len, rows, self.size
            )));
        }

        if src_stride == row_len {
            return self.write_data(offset, &src[..row_len * rows]);
        }

        let mapped = self.mapped_ptr()?;
        for (row, chunk) in src.chunks(src_stride).take(rows).enumerate() {
            unsafe {
                let dst = mapped.add(offset as usize + row * row_len);
                std::ptr::copy_nonoverlapping(chunk.as_ptr(), dst, row_len);
            }
        }
        Ok(())
    }

    fn mapped_ptr(&self) -> RhiResult<*mut u8> {
        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;
        allocation
            .mapped_ptr()
            .map(|ptr| ptr.as_ptr() as *mut u8)
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().lock().free(allocation)
        {
            error!("Failed to free {} buffer allocation: {:?}", self.usage.name(), e);
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
    }
}

// Safety: the mapped pointer is only written through `&self` methods whose
// callers own the slot the buffer belongs to.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_buffer_usage_is_host_visible() {
        for usage in [BufferUsage::Vertex, BufferUsage::Staging] {
            assert_eq!(usage.memory_location(), MemoryLocation::CpuToGpu);
        }
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Staging.name(), "staging");
    }
}
