//! Binding type shorthands for compute bind group layouts

pub fn buffer(read_only: bool) -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Storage { read_only },
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

pub fn storage_buffer_read_write() -> wgpu::BindingType {
    buffer(false)
}

pub fn storage_buffer_read_only() -> wgpu::BindingType {
    buffer(true)
}

pub fn uniform() -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Uniform,
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

/// Layout entry visible to the compute stage only
pub fn compute_entry(binding: u32, ty: wgpu::BindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty,
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_entry_visibility() {
        let entry = compute_entry(2, uniform());
        assert_eq!(entry.binding, 2);
        assert_eq!(entry.visibility, wgpu::ShaderStages::COMPUTE);
        assert!(matches!(
            entry.ty,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                ..
            }
        ));
    }

    #[test]
    fn test_storage_access() {
        assert!(matches!(
            storage_buffer_read_only(),
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                ..
            }
        ));
        assert!(matches!(
            storage_buffer_read_write(),
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                ..
            }
        ));
    }
}
