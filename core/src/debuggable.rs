//! Introspection of live driver state

use std::borrow::Cow;
use std::fmt;

#[macro_export]
macro_rules! dbgprop_header {
    ($name:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::Header)
    };
}

#[macro_export]
macro_rules! dbgprop_bool {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::Boolean($val))
    };
}

#[macro_export]
macro_rules! dbgprop_udec {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new(
            $name,
            DebuggablePropertyValue::UnsignedDecimal(u64::try_from($val).unwrap_or(u64::MAX)),
        )
    };
}

#[macro_export]
macro_rules! dbgprop_enum {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new(
            $name,
            DebuggablePropertyValue::StaticStr($val.clone().into()),
        )
    };
}

#[macro_export]
macro_rules! dbgprop_string {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::String($val))
    };
}

#[macro_export]
macro_rules! dbgprop_group {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::Nested($val))
    };
}

pub type DebuggableProperties = Vec<DebuggableProperty>;

pub struct DebuggableProperty {
    name: Cow<'static, str>,
    value: DebuggablePropertyValue,
}

impl DebuggableProperty {
    pub fn new(name: impl Into<Cow<'static, str>>, value: DebuggablePropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &DebuggablePropertyValue {
        &self.value
    }
}

pub enum DebuggablePropertyValue {
    Header,
    Nested(DebuggableProperties),
    Boolean(bool),
    UnsignedDecimal(u64),
    StaticStr(&'static str),
    String(String),
}

impl fmt::Display for DebuggablePropertyValue {
    /// Renders scalar values. Headers and nested groups render empty.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Header | Self::Nested(_) => Ok(()),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::UnsignedDecimal(v) => write!(f, "{}", v),
            Self::StaticStr(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
        }
    }
}

pub trait Debuggable {
    fn get_debug_properties(&self) -> DebuggableProperties;
}

/// Writes a property tree, one property per line, nesting by indentation
pub fn write_properties(
    w: &mut impl fmt::Write,
    props: &[DebuggableProperty],
    depth: usize,
) -> fmt::Result {
    for p in props {
        match p.value() {
            DebuggablePropertyValue::Header => {
                writeln!(w, "{:indent$}[{}]", "", p.name(), indent = depth * 2)?;
            }
            DebuggablePropertyValue::Nested(children) => {
                writeln!(w, "{:indent$}{}:", "", p.name(), indent = depth * 2)?;
                write_properties(w, children, depth + 1)?;
            }
            v => writeln!(w, "{:indent$}{}: {}", "", p.name(), v, indent = depth * 2)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_tree() {
        let props = vec![
            dbgprop_header!("Device"),
            dbgprop_bool!("Ready", true),
            dbgprop_group!(
                "Slot 0",
                vec![
                    dbgprop_udec!("X", 12_u32),
                    dbgprop_string!("Seen", "never".to_string()),
                ]
            ),
            dbgprop_enum!("Power", crate::elan::PowerState::Asleep),
        ];

        let mut s = String::new();
        write_properties(&mut s, &props, 0).unwrap();
        assert_eq!(
            s,
            "[Device]\nReady: true\nSlot 0:\n  X: 12\n  Seen: never\nPower: Asleep\n"
        );
    }
}
