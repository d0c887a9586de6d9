//! In-memory transaction payloads.
//!
//! A `Parcel` is an ordered list of values written by the caller and read
//! back in the same order by the stub. Handles travel inside parcels so the
//! transport can translate them when the parcel crosses a process boundary.
//! There is no byte encoding: transports move the values as they are.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::error::{Error, Result};
use crate::ipc::binder::HandleRef;
use crate::service::ServiceId;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    StrList(Vec<String>),
    Handle(HandleRef),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::StrList(v) => write!(f, "StrList({v:?})"),
            Value::Handle(_) => write!(f, "Handle(..)"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Parcel {
    values: VecDeque<Value>,
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: Value) {
        self.values.push_back(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.push(Value::Bool(value));
    }

    pub fn write_i64(&mut self, value: i64) {
        self.push(Value::Int(value));
    }

    pub fn write_str(&mut self, value: &str) {
        self.push(Value::Str(value.to_string()));
    }

    pub fn write_str_list(&mut self, values: &[String]) {
        self.push(Value::StrList(values.to_vec()));
    }

    pub fn write_handle(&mut self, handle: Option<HandleRef>) {
        match handle {
            Some(handle) => self.push(Value::Handle(handle)),
            None => self.push(Value::Null),
        }
    }

    pub fn write_service_id(&mut self, id: &ServiceId) {
        match id {
            ServiceId::Num(n) => self.push(Value::Int(i64::from(*n))),
            ServiceId::Name(name) => self.push(Value::Str(name.clone())),
        }
    }

    fn next(&mut self) -> Result<Value> {
        self.values
            .pop_front()
            .ok_or(Error::Marshal("read past end of parcel"))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.next()? {
            Value::Bool(v) => Ok(v),
            _ => Err(Error::Marshal("expected bool")),
        }
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        match self.next()? {
            Value::Int(v) => Ok(v),
            _ => Err(Error::Marshal("expected int")),
        }
    }

    pub fn read_str(&mut self) -> Result<String> {
        match self.next()? {
            Value::Str(v) => Ok(v),
            _ => Err(Error::Marshal("expected string")),
        }
    }

    pub fn read_str_list(&mut self) -> Result<Vec<String>> {
        match self.next()? {
            Value::StrList(v) => Ok(v),
            _ => Err(Error::Marshal("expected string list")),
        }
    }

    /// Reads a handle slot written by `write_handle`; `Null` reads as `None`.
    pub fn read_handle(&mut self) -> Result<Option<HandleRef>> {
        match self.next()? {
            Value::Handle(h) => Ok(Some(h)),
            Value::Null => Ok(None),
            _ => Err(Error::Marshal("expected handle")),
        }
    }

    pub fn read_service_id(&mut self) -> Result<ServiceId> {
        match self.next()? {
            Value::Int(n) => i32::try_from(n)
                .map(ServiceId::Num)
                .map_err(|_| Error::Marshal("service id overflows i32")),
            Value::Str(name) => Ok(ServiceId::Name(name)),
            _ => Err(Error::Marshal("expected service id")),
        }
    }

    /// Rewrites every value in place. Transports use this to translate
    /// handles when a parcel changes process.
    pub fn try_map<E>(
        self,
        mut f: impl FnMut(Value) -> std::result::Result<Value, E>,
    ) -> std::result::Result<Self, E> {
        let values = self
            .values
            .into_iter()
            .map(&mut f)
            .collect::<std::result::Result<VecDeque<_>, E>>()?;
        Ok(Self { values })
    }
}

/// Keyed payload exchanged over the discovery channel.
#[derive(Clone, Debug, Default)]
pub struct Bundle {
    entries: HashMap<String, Value>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn put(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn put_handle(&mut self, key: &str, handle: HandleRef) {
        self.put(key, Value::Handle(handle));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// The handle stored under `key`, if the entry exists and holds one.
    pub fn handle(&self, key: &str) -> Option<HandleRef> {
        match self.entries.get(key) {
            Some(Value::Handle(h)) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn try_map<E>(
        self,
        mut f: impl FnMut(Value) -> std::result::Result<Value, E>,
    ) -> std::result::Result<Self, E> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for (key, value) in self.entries {
            entries.insert(key, f(value)?);
        }
        Ok(Self { entries })
    }
}
