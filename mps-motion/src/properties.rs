//! # Algorithm options
//!
//! Every flow algorithm exposes its tunables as named, bounded properties. Option maps are plain
//! snapshots of those properties, which makes it possible to merge user overrides over the
//! defaults and feed the result back into a freshly constructed algorithm.

use log::*;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

/// Named option values.
pub type Options = BTreeMap<String, Property>;

/// Object with named properties.
pub trait Properties {
    /// Get mutable handles to all properties.
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![]
    }

    /// Snapshot all properties.
    fn props(&mut self) -> Vec<(&str, Property)> {
        self.props_mut()
            .into_iter()
            .map(|(n, p)| (n, p.into()))
            .collect()
    }

    /// Snapshot all properties into an option map.
    fn options(&mut self) -> Options {
        self.props()
            .into_iter()
            .map(|(n, p)| (n.to_string(), p))
            .collect()
    }

    /// Apply values from an option map.
    ///
    /// Values are matched by name, numeric values get clamped into their bounds. Unknown names
    /// are reported and skipped.
    fn apply_options(&mut self, options: &Options) {
        let mut props = self.props_mut();

        for (name, value) in options {
            match props.iter_mut().find(|(n, _)| n == name) {
                Some((_, prop)) => prop.set(value),
                None => warn!("Ignoring unknown option {name}"),
            }
        }
    }
}

/// Merge `overrides` over `defaults`.
///
/// Keys present in both maps take the value from `overrides`.
pub fn merge_options(defaults: Options, overrides: &Options) -> Options {
    let mut merged = defaults;
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Property with a lower and upper bound.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct BoundedProp<T> {
    pub val: T,
    pub min: T,
    pub max: T,
}

impl<T> Deref for BoundedProp<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.val
    }
}

impl<T> DerefMut for BoundedProp<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.val
    }
}

impl<'a, T: Copy> From<BoundedPropMut<'a, T>> for BoundedProp<T> {
    fn from(BoundedPropMut { val, min, max }: BoundedPropMut<'a, T>) -> Self {
        Self {
            val: *val,
            min,
            max,
        }
    }
}

/// Value of a single option.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum Property {
    String(String),
    Bool(bool),
    Float(BoundedProp<f32>),
    Usize(BoundedProp<usize>),
}

impl Property {
    /// Unbounded float value, used for user supplied overrides.
    pub fn float(val: f32) -> Self {
        Self::Float(BoundedProp {
            val,
            min: f32::MIN,
            max: f32::MAX,
        })
    }

    /// Unbounded integer value, used for user supplied overrides.
    pub fn usize(val: usize) -> Self {
        Self::Usize(BoundedProp {
            val,
            min: usize::MIN,
            max: usize::MAX,
        })
    }

    /// Parse a textual option value.
    ///
    /// `true`/`false` become booleans, integers become `Usize`, other numbers become `Float`, and
    /// anything else is kept as a string.
    pub fn parse(s: &str) -> Self {
        if let Ok(b) = s.parse::<bool>() {
            Self::Bool(b)
        } else if let Ok(u) = s.parse::<usize>() {
            Self::usize(u)
        } else if let Ok(f) = s.parse::<f32>() {
            Self::float(f)
        } else {
            Self::String(s.to_string())
        }
    }
}

impl<'a> From<PropertyMut<'a>> for Property {
    fn from(prop: PropertyMut<'a>) -> Self {
        match prop {
            PropertyMut::String(s) => Self::String(s.clone()),
            PropertyMut::Bool(b) => Self::Bool(*b),
            PropertyMut::Float(p) => Self::Float(p.into()),
            PropertyMut::Usize(p) => Self::Usize(p.into()),
        }
    }
}

/// Mutable property with a lower and upper bound.
pub struct BoundedPropMut<'a, T> {
    pub val: &'a mut T,
    pub min: T,
    pub max: T,
}

impl<'a, T> Deref for BoundedPropMut<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.val
    }
}

impl<'a, T: PartialOrd + Copy> BoundedPropMut<'a, T> {
    fn set_clamped(&mut self, val: T) {
        *self.val = if val < self.min {
            self.min
        } else if val > self.max {
            self.max
        } else {
            val
        };
    }
}

/// Mutable handle to a property.
pub enum PropertyMut<'a> {
    String(&'a mut String),
    Bool(&'a mut bool),
    Float(BoundedPropMut<'a, f32>),
    Usize(BoundedPropMut<'a, usize>),
}

impl<'a> PropertyMut<'a> {
    /// Create a boolean property.
    ///
    /// # Arguments
    ///
    /// * `b` - reference to the underlying boolean to be mutated.
    pub fn bool(b: &'a mut bool) -> Self {
        Self::Bool(b)
    }

    /// Create a floating point property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying float to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn float(val: &'a mut f32, min: f32, max: f32) -> Self {
        Self::Float(BoundedPropMut { val, min, max })
    }

    /// Create an integer property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying usize to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn usize(val: &'a mut usize, min: usize, max: usize) -> Self {
        Self::Usize(BoundedPropMut { val, min, max })
    }

    /// Set the value from another property.
    ///
    /// Integers are accepted for float properties and vice versa. Other type mismatches are
    /// ignored.
    pub fn set(&mut self, other: &Property) {
        match (self, other) {
            (Self::String(s), Property::String(os)) => **s = os.clone(),
            (Self::Bool(b), Property::Bool(ob)) => **b = *ob,
            (Self::Float(val), Property::Float(oval)) => val.set_clamped(oval.val),
            (Self::Float(val), Property::Usize(oval)) => val.set_clamped(oval.val as f32),
            (Self::Usize(val), Property::Usize(oval)) => val.set_clamped(oval.val),
            (Self::Usize(val), Property::Float(oval)) if oval.val >= 0.0 => {
                val.set_clamped(oval.val.round() as usize)
            }
            (_, other) => warn!("Ignoring mismatched option value {other:?}"),
        }
    }
}
