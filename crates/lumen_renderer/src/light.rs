use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LightRegistryError {
    #[error("light registry is full ({capacity} lights)")]
    CapacityExceeded { capacity: u32 },
    #[error("no light registered at index {index} (registry holds {len})")]
    UnknownLight { index: u32, len: u32 },
}

/// A point light as the scene describes it.
#[derive(Clone, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    /// Influence cutoff; the light contributes nothing beyond this distance.
    pub radius: f32,
    pub ambient_intensity: f32,
    pub diffuse_intensity: f32,
    pub specular_intensity: f32,
    pub attenuation_constant: f32,
    pub attenuation_linear: f32,
    pub attenuation_exp: f32,
    pub enabled: bool,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            radius: 10.0,
            ambient_intensity: 0.1,
            diffuse_intensity: 1.0,
            specular_intensity: 0.2,
            attenuation_constant: 1.0,
            attenuation_linear: 0.0,
            attenuation_exp: 0.0,
            enabled: true,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, radius: f32) -> Self {
        Self {
            position,
            radius,
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_intensities(mut self, ambient: f32, diffuse: f32, specular: f32) -> Self {
        self.ambient_intensity = ambient;
        self.diffuse_intensity = diffuse;
        self.specular_intensity = specular;
        self
    }

    pub fn with_attenuation(mut self, constant: f32, linear: f32, exp: f32) -> Self {
        self.attenuation_constant = constant;
        self.attenuation_linear = linear;
        self.attenuation_exp = exp;
        self
    }
}

/// Shader-side light. Must match `PointLight` in the WGSL sources (64 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuPointLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub enabled: u32,
    pub ambient_intensity: f32,
    pub diffuse_intensity: f32,
    pub specular_intensity: f32,
    pub attenuation_constant: f32,
    pub attenuation_linear: f32,
    pub attenuation_exp: f32,
    pub _padding: [f32; 2],
}

impl GpuPointLight {
    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }

    pub fn center(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

impl From<&PointLight> for GpuPointLight {
    fn from(light: &PointLight) -> Self {
        Self {
            position: light.position.to_array(),
            radius: light.radius,
            color: light.color.to_array(),
            enabled: light.enabled as u32,
            ambient_intensity: light.ambient_intensity,
            diffuse_intensity: light.diffuse_intensity,
            specular_intensity: light.specular_intensity,
            attenuation_constant: light.attenuation_constant,
            attenuation_linear: light.attenuation_linear,
            attenuation_exp: light.attenuation_exp,
            _padding: [0.0; 2],
        }
    }
}

/// Index of a registered light. Equal to its slot in the GPU light array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightId(pub u32);

/// The active set of point lights, kept in shader-ready form.
///
/// Lights are scene-scoped: they are appended one by one while a scene is
/// entered and dropped all at once by [`LightRegistry::clear`] when it exits.
#[derive(Debug)]
pub struct LightRegistry {
    capacity: u32,
    lights: Vec<GpuPointLight>,
    /// Bumped on every mutation so frame slots can tell whether their copy is stale.
    version: u64,
}

impl LightRegistry {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            lights: Vec::with_capacity(capacity as usize),
            version: 0,
        }
    }

    pub fn add_light(&mut self, light: &PointLight) -> Result<LightId, LightRegistryError> {
        if self.lights.len() as u32 >= self.capacity {
            return Err(LightRegistryError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let id = LightId(self.lights.len() as u32);
        self.lights.push(GpuPointLight::from(light));
        self.version += 1;
        Ok(id)
    }

    pub fn update_light(&mut self, id: LightId, light: &PointLight) -> Result<(), LightRegistryError> {
        let slot = self.slot_mut(id)?;
        *slot = GpuPointLight::from(light);
        self.version += 1;
        Ok(())
    }

    pub fn set_light_enabled(&mut self, id: LightId, enabled: bool) -> Result<(), LightRegistryError> {
        let slot = self.slot_mut(id)?;
        slot.enabled = enabled as u32;
        self.version += 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        if !self.lights.is_empty() {
            log::debug!("Clearing {} lights", self.lights.len());
        }
        self.lights.clear();
        self.version += 1;
    }

    pub fn get(&self, id: LightId) -> Option<&GpuPointLight> {
        self.lights.get(id.0 as usize)
    }

    pub fn lights(&self) -> &[GpuPointLight] {
        &self.lights
    }

    pub fn len(&self) -> u32 {
        self.lights.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn slot_mut(&mut self, id: LightId) -> Result<&mut GpuPointLight, LightRegistryError> {
        let len = self.lights.len() as u32;
        self.lights
            .get_mut(id.0 as usize)
            .ok_or(LightRegistryError::UnknownLight { index: id.0, len })
    }
}
