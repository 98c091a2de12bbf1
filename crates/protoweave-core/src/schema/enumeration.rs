//! Enum types.

use super::types::EnumId;
use std::collections::HashMap;

/// A value of an enum field: a declared constant or a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumValue<'a> {
    /// A number the enum declares
    Known {
        /// The first declared name for the number
        name: &'a str,
        /// The number
        number: i32,
    },
    /// A number the enum does not declare
    Unknown(i32),
}

impl<'a> EnumValue<'a> {
    /// The numeric value
    pub fn number(&self) -> i32 {
        match *self {
            EnumValue::Known { number, .. } => number,
            EnumValue::Unknown(number) => number,
        }
    }

    /// The symbolic name, if the number is declared
    pub fn name(&self) -> Option<&'a str> {
        match *self {
            EnumValue::Known { name, .. } => Some(name),
            EnumValue::Unknown(_) => None,
        }
    }

    /// Returns true if the number is declared
    pub fn is_known(&self) -> bool {
        matches!(self, EnumValue::Known { .. })
    }
}

/// An enum type: a bidirectional name <-> number map.
///
/// Several names may share a number. [`EnumType::name_of`] returns the
/// first declared name for a number, while [`EnumType::number_of`] resolves
/// every declared name.
#[derive(Debug, Clone)]
pub struct EnumType {
    pub(crate) id: EnumId,
    pub(crate) package: String,
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) values: Vec<(String, i32)>,
    pub(crate) by_name: HashMap<String, i32>,
    pub(crate) by_number: HashMap<i32, usize>,
}

impl EnumType {
    pub(crate) fn new(
        id: EnumId,
        package: String,
        name: String,
        full_name: String,
        values: Vec<(String, i32)>,
    ) -> Self {
        let mut by_name = HashMap::with_capacity(values.len());
        let mut by_number = HashMap::with_capacity(values.len());
        for (i, (value_name, number)) in values.iter().enumerate() {
            by_name.insert(value_name.clone(), *number);
            by_number.entry(*number).or_insert(i);
        }
        Self {
            id,
            package,
            name,
            full_name,
            values,
            by_name,
            by_number,
        }
    }

    /// This type's id in its schema
    pub fn id(&self) -> EnumId {
        self.id
    }

    /// Package name, possibly empty
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Name relative to the package
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name without a leading dot
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Declared values in declaration order, aliases included
    pub fn values(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.values.iter().map(|(name, number)| (name.as_str(), *number))
    }

    /// The first declared name for `number`
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.by_number
            .get(&number)
            .map(|&i| self.values[i].0.as_str())
    }

    /// The number declared for `name`
    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    /// Resolves a number to a known or unknown value
    pub fn value(&self, number: i32) -> EnumValue<'_> {
        match self.name_of(number) {
            Some(name) => EnumValue::Known { name, number },
            None => EnumValue::Unknown(number),
        }
    }

    /// The number of the first declared value
    pub fn default_number(&self) -> i32 {
        self.values.first().map(|(_, number)| *number).unwrap_or(0)
    }

    /// Returns true for `google.protobuf.NullValue`
    pub fn is_null_value(&self) -> bool {
        self.full_name == "google.protobuf.NullValue"
    }
}
