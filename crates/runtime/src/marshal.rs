//! Typed reads and writes of uniform values.
//!
//! Every conversion between the declared uniform type, the requested
//! representation and the storage layout lives here. Element counts are
//! clamped to the uniform's component count; each call returns how many
//! elements were transferred.

use crate::storage::{UniformLayout, UniformStorage};
use crate::types::{Uniform, UniformBase, UniformType};

impl UniformStorage {
    /// True when the lanes of a uniform of type `ty` hold IEEE floats.
    fn stores_float(&self, ty: UniformType) -> bool {
        self.layout() == UniformLayout::FloatOnly || ty.is_float()
    }

    pub fn get_bool(&self, uniform: &Uniform, out: &mut [bool]) -> usize {
        let lanes = self.lanes(uniform);
        let count = out.len().min(lanes.len());
        for (slot, lane) in out.iter_mut().zip(lanes).take(count) {
            *slot = *lane != 0;
        }
        count
    }

    pub fn get_i32(&self, uniform: &Uniform, out: &mut [i32]) -> usize {
        let float_lanes = self.stores_float(uniform.ty());
        let lanes = self.lanes(uniform);
        let count = out.len().min(lanes.len());
        if float_lanes {
            for (slot, lane) in out.iter_mut().zip(lanes).take(count) {
                *slot = f32::from_bits(*lane) as i32;
            }
        } else {
            out[..count].copy_from_slice(bytemuck::cast_slice(&lanes[..count]));
        }
        count
    }

    pub fn get_u32(&self, uniform: &Uniform, out: &mut [u32]) -> usize {
        let float_lanes = self.stores_float(uniform.ty());
        let lanes = self.lanes(uniform);
        let count = out.len().min(lanes.len());
        if float_lanes {
            for (slot, lane) in out.iter_mut().zip(lanes).take(count) {
                *slot = f32::from_bits(*lane) as u32;
            }
        } else {
            out[..count].copy_from_slice(&lanes[..count]);
        }
        count
    }

    pub fn get_f32(&self, uniform: &Uniform, out: &mut [f32]) -> usize {
        let ty = uniform.ty();
        let float_lanes = self.stores_float(ty);
        let lanes = self.lanes(uniform);
        let count = out.len().min(lanes.len());
        if float_lanes {
            out[..count].copy_from_slice(bytemuck::cast_slice(&lanes[..count]));
            return count;
        }
        for (slot, lane) in out.iter_mut().zip(lanes).take(count) {
            *slot = match ty.base {
                UniformBase::Uint => *lane as f32,
                _ => *lane as i32 as f32,
            };
        }
        count
    }

    pub fn set_bool(&mut self, uniform: &Uniform, values: &[bool]) -> usize {
        let float_lanes = self.stores_float(uniform.ty());
        let lanes = self.lanes_mut(uniform);
        let count = values.len().min(lanes.len());
        for (lane, value) in lanes.iter_mut().zip(values).take(count) {
            *lane = match (float_lanes, *value) {
                (true, true) => 1.0f32.to_bits(),
                (true, false) => 0.0f32.to_bits(),
                (false, value) => u32::from(value),
            };
        }
        count
    }

    pub fn set_i32(&mut self, uniform: &Uniform, values: &[i32]) -> usize {
        let float_lanes = self.stores_float(uniform.ty());
        let lanes = self.lanes_mut(uniform);
        let count = values.len().min(lanes.len());
        if float_lanes {
            for (lane, value) in lanes.iter_mut().zip(values).take(count) {
                *lane = (*value as f32).to_bits();
            }
        } else {
            lanes[..count].copy_from_slice(bytemuck::cast_slice(&values[..count]));
        }
        count
    }

    pub fn set_u32(&mut self, uniform: &Uniform, values: &[u32]) -> usize {
        let float_lanes = self.stores_float(uniform.ty());
        let lanes = self.lanes_mut(uniform);
        let count = values.len().min(lanes.len());
        if float_lanes {
            for (lane, value) in lanes.iter_mut().zip(values).take(count) {
                *lane = (*value as f32).to_bits();
            }
        } else {
            lanes[..count].copy_from_slice(&values[..count]);
        }
        count
    }

    pub fn set_f32(&mut self, uniform: &Uniform, values: &[f32]) -> usize {
        let ty = uniform.ty();
        let float_lanes = self.stores_float(ty);
        let lanes = self.lanes_mut(uniform);
        let count = values.len().min(lanes.len());
        if float_lanes {
            lanes[..count].copy_from_slice(bytemuck::cast_slice(&values[..count]));
            return count;
        }
        for (lane, value) in lanes.iter_mut().zip(values).take(count) {
            *lane = match ty.base {
                UniformBase::Uint => *value as u32,
                _ => *value as i32 as u32,
            };
        }
        count
    }

    /// Restores the initializer, or zeroes the range when there is none.
    pub fn reset(&mut self, uniform: &Uniform) {
        let ty = uniform.ty();
        let convert = self.layout() == UniformLayout::FloatOnly && !ty.is_float();
        let initializer = uniform.initializer().copied();
        let lanes = self.lanes_mut(uniform);
        let Some(initializer) = initializer else {
            lanes.fill(0);
            return;
        };
        for (lane, raw) in lanes.iter_mut().zip(initializer.lanes) {
            *lane = if !convert {
                raw
            } else if ty.base == UniformBase::Uint {
                (raw as f32).to_bits()
            } else {
                (raw as i32 as f32).to_bits()
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Constant, UniformType};

    fn storage_with(layout: UniformLayout, ty: UniformType) -> (UniformStorage, Uniform) {
        let mut storage = UniformStorage::new(layout);
        let offset = storage.allocate(ty.size());
        (storage, Uniform::new("value", ty, offset))
    }

    #[test]
    fn native_int_truncates_written_floats() {
        let (mut storage, uniform) =
            storage_with(UniformLayout::Native, UniformType::vector(UniformBase::Int, 3));
        assert_eq!(storage.set_f32(&uniform, &[1.7, -2.9, 3.0]), 3);
        let mut out = [0i32; 3];
        storage.get_i32(&uniform, &mut out);
        assert_eq!(out, [1, -2, 3]);
    }

    #[test]
    fn float_only_keeps_exact_float_bits() {
        let (mut storage, uniform) =
            storage_with(UniformLayout::FloatOnly, UniformType::vector(UniformBase::Int, 2));
        storage.set_f32(&uniform, &[1.7, -2.9]);
        let mut out = [0.0f32; 2];
        storage.get_f32(&uniform, &mut out);
        assert_eq!(out[0].to_bits(), 1.7f32.to_bits());
        assert_eq!(out[1].to_bits(), (-2.9f32).to_bits());

        let mut ints = [0i32; 2];
        storage.get_i32(&uniform, &mut ints);
        assert_eq!(ints, [1, -2]);
    }

    #[test]
    fn float_only_encodes_booleans_as_floats() {
        let (mut storage, uniform) =
            storage_with(UniformLayout::FloatOnly, UniformType::vector(UniformBase::Bool, 2));
        storage.set_bool(&uniform, &[true, false]);
        assert_eq!(&storage.as_bytes()[..4], &1.0f32.to_ne_bytes());
        let mut out = [false; 2];
        storage.get_bool(&uniform, &mut out);
        assert_eq!(out, [true, false]);
    }

    #[test]
    fn native_bool_reads_back_as_int() {
        let (mut storage, uniform) =
            storage_with(UniformLayout::Native, UniformType::scalar(UniformBase::Bool));
        storage.set_bool(&uniform, &[true]);
        let mut out = [0i32; 1];
        storage.get_i32(&uniform, &mut out);
        assert_eq!(out, [1]);
        let mut floats = [0.0f32; 1];
        storage.get_f32(&uniform, &mut floats);
        assert_eq!(floats, [1.0]);
    }

    #[test]
    fn unsigned_values_convert_without_sign() {
        let (mut storage, uniform) =
            storage_with(UniformLayout::Native, UniformType::scalar(UniformBase::Uint));
        storage.set_u32(&uniform, &[u32::MAX]);
        let mut out = [0.0f32; 1];
        storage.get_f32(&uniform, &mut out);
        assert_eq!(out[0], u32::MAX as f32);
    }

    #[test]
    fn counts_clamp_to_components() {
        let (mut storage, uniform) =
            storage_with(UniformLayout::Native, UniformType::vector(UniformBase::Float, 2));
        let next = storage.allocate(4);
        let neighbour = Uniform::new("neighbour", UniformType::scalar(UniformBase::Float), next);
        storage.set_f32(&neighbour, &[5.0]);

        assert_eq!(storage.set_f32(&uniform, &[1.0; 16]), 2);
        let mut out = [9.0f32; 16];
        assert_eq!(storage.get_f32(&uniform, &mut out), 2);
        assert_eq!(&out[..3], &[1.0, 1.0, 9.0]);

        let mut neighbour_value = [0.0f32];
        storage.get_f32(&neighbour, &mut neighbour_value);
        assert_eq!(neighbour_value, [5.0]);
    }

    #[test]
    fn reset_without_initializer_zeroes() {
        let ty = UniformType::matrix(UniformBase::Float, 4, 4);
        let (mut storage, uniform) = storage_with(UniformLayout::Native, ty);
        storage.set_f32(&uniform, &[3.5; 16]);
        storage.reset(&uniform);
        let mut out = [1.0f32; 16];
        assert_eq!(storage.get_f32(&uniform, &mut out), 16);
        assert!(out.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn reset_converts_initializer_on_float_only() {
        let ty = UniformType::vector(UniformBase::Int, 2);
        let mut storage = UniformStorage::new(UniformLayout::FloatOnly);
        let offset = storage.allocate(ty.size());
        let uniform = Uniform::new("steps", ty, offset).with_initializer(Constant::from_i32(&[4, -1]));
        storage.reset(&uniform);
        let mut out = [0.0f32; 2];
        storage.get_f32(&uniform, &mut out);
        assert_eq!(out, [4.0, -1.0]);
    }

    #[test]
    fn reset_copies_initializer_on_native() {
        let ty = UniformType::scalar(UniformBase::Int);
        let mut storage = UniformStorage::new(UniformLayout::Native);
        let offset = storage.allocate(ty.size());
        let uniform = Uniform::new("passes", ty, offset).with_initializer(Constant::from_i32(&[-7]));
        storage.reset(&uniform);
        let mut out = [0i32; 1];
        storage.get_i32(&uniform, &mut out);
        assert_eq!(out, [-7]);
    }
}
