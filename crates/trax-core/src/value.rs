#![forbid(unsafe_code)]

//! Field values held by trax objects.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::object::TraxObject;

/// Opaque shared value stored by reference.
///
/// Two refs are equal when they point to the same allocation.
#[derive(Clone)]
pub struct ExternalRef(Rc<dyn Any>);

impl ExternalRef {
    pub fn new<T: 'static>(value: T) -> Self {
        Self(Rc::new(value))
    }

    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl PartialEq for ExternalRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalRef({:p})", Rc::as_ptr(&self.0))
    }
}

/// A field value.
///
/// `Data` holds plain JSON objects or arrays. They are wrapped into tracked
/// [`TraxObject`]s when written to a field, unless the field's wrap level is
/// 1, in which case they are stored as is. Objects compare by identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Absent field or cleared array slot.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(TraxObject),
    Data(Json),
    Ref(ExternalRef),
}

impl Value {
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Data(Json::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Data(Json::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Data(Json::String(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&TraxObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_object(self) -> Option<TraxObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_data(&self) -> Option<&Json> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Ref(r) => r.downcast_ref(),
            _ => None,
        }
    }

    /// Plain object or array that would be wrapped on write.
    pub(crate) fn is_wrappable(&self) -> bool {
        matches!(self, Self::Data(Json::Object(_) | Json::Array(_)))
    }

    /// Untracked deep snapshot. `Undefined` and refs become `null`.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Undefined | Self::Null | Self::Ref(_) => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => number(*n),
            Self::String(s) => Json::String(s.clone()),
            Self::Object(o) => o.to_json(),
            Self::Data(d) => d.clone(),
        }
    }

    /// Shallow form used in log payloads; `None` for `Undefined`.
    pub(crate) fn log_repr(&self) -> Option<Json> {
        match self {
            Self::Undefined => None,
            Self::Object(o) => Some(Json::String(format!("[TRAX {}]", o.id()))),
            Self::Ref(_) => Some(Json::String("[REF]".to_owned())),
            other => Some(other.to_json()),
        }
    }
}

fn number(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Json::String(s) => Self::String(s),
            data @ (Json::Array(_) | Json::Object(_)) => Self::Data(data),
        }
    }
}

impl From<TraxObject> for Value {
    fn from(o: TraxObject) -> Self {
        Self::Object(o)
    }
}

impl From<&TraxObject> for Value {
    fn from(o: &TraxObject) -> Self {
        Self::Object(o.clone())
    }
}

impl From<ExternalRef> for Value {
    fn from(r: ExternalRef) -> Self {
        Self::Ref(r)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Self::Number(n as f64)
            }
        })*
    };
}

number_from!(f64, f32, i32, i64, u32, u64, usize);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Undefined, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_become_scalars() {
        assert_eq!(Value::from(json!(3)), Value::Number(3.0));
        assert_eq!(Value::from(json!("a")), Value::String("a".into()));
        assert_eq!(Value::from(json!(null)), Value::Null);
        assert!(Value::from(json!({"a": 1})).is_wrappable());
        assert!(Value::from(json!([1])).is_wrappable());
        assert!(!Value::from(json!(true)).is_wrappable());
    }

    #[test]
    fn refs_compare_by_identity() {
        let a = ExternalRef::new(vec![1, 2]);
        let b = ExternalRef::new(vec![1, 2]);
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a.clone()), Value::from(b));
        assert_eq!(Value::from(a).as_ref::<Vec<i32>>(), Some(&vec![1, 2]));
    }

    #[test]
    fn integral_numbers_log_as_integers() {
        assert_eq!(Value::from(2).to_json(), json!(2));
        assert_eq!(Value::from(2.5).to_json(), json!(2.5));
        assert_eq!(Value::Undefined.log_repr(), None);
        assert_eq!(Value::from("x").log_repr(), Some(json!("x")));
    }
}
