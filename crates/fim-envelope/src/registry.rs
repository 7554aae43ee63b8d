//! The typed serializer: every persistent object is framed as
//! `type_id(u32), version(i32), size_placeholder(i32), ref_index(i32),
//! payload` and read back through a per-type factory (spec.md §4.10).

use std::collections::HashMap;
use std::rc::Rc;

use fim_error::{FimError, Result, SerializerError};

use crate::type_id::type_id_of;

/// Anything the registry can write and reconstruct.
pub trait Serializable {
    fn canonical_type_name(&self) -> &'static str;
    fn version(&self) -> i32;
    fn write_payload(&self) -> Vec<u8>;
}

type ByValueFactory = Box<dyn Fn(i32, &[u8]) -> Result<Box<dyn Serializable>>>;
type RefCountedFactory = Box<dyn Fn(i32, &[u8]) -> Result<Rc<dyn Serializable>>>;

/// Process-wide in spirit, but explicitly assembled by the caller at
/// startup rather than populated by constructor side-effects (spec.md
/// §9's "global registries" re-architecture note).
#[derive(Default)]
pub struct Registry {
    by_value: HashMap<u32, ByValueFactory>,
    ref_counted: HashMap<u32, RefCountedFactory>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a by-value factory for `canonical_name`. Fails fast on
    /// duplicate registration (spec.md §5).
    pub fn register_by_value(
        &mut self,
        canonical_name: &str,
        factory: impl Fn(i32, &[u8]) -> Result<Box<dyn Serializable>> + 'static,
    ) -> Result<()> {
        let id = type_id_of(canonical_name);
        if self.by_value.contains_key(&id) {
            return Err(FimError::Internal(format!(
                "duplicate by-value registration for {canonical_name}"
            )));
        }
        self.by_value.insert(id, Box::new(factory));
        Ok(())
    }

    /// Register a reference-counted factory for `canonical_name`.
    pub fn register_ref_counted(
        &mut self,
        canonical_name: &str,
        factory: impl Fn(i32, &[u8]) -> Result<Rc<dyn Serializable>> + 'static,
    ) -> Result<()> {
        let id = type_id_of(canonical_name);
        if self.ref_counted.contains_key(&id) {
            return Err(FimError::Internal(format!(
                "duplicate ref-counted registration for {canonical_name}"
            )));
        }
        self.ref_counted.insert(id, Box::new(factory));
        Ok(())
    }

    /// Write a by-value object's frame.
    #[must_use]
    pub fn write_by_value(obj: &dyn Serializable) -> Vec<u8> {
        write_frame(obj.canonical_type_name(), obj.version(), -1, &obj.write_payload())
    }

    /// Read a by-value frame, dispatching to the registered factory.
    pub fn read_by_value(&self, buf: &[u8]) -> Result<(Box<dyn Serializable>, &[u8])> {
        let (type_id, version, _ref_index, payload, rest) = read_frame(buf)?;
        let factory = self
            .by_value
            .get(&type_id)
            .ok_or(FimError::Serializer(SerializerError::UnknownType(type_id)))?;
        Ok((factory(version, payload)?, rest))
    }

    #[must_use]
    pub fn read_ref_counted<'a>(
        &self,
        buf: &'a [u8],
        interned: &mut Vec<Rc<dyn Serializable>>,
    ) -> Result<(Rc<dyn Serializable>, &'a [u8])> {
        let (type_id, version, ref_index, payload, rest) = read_frame(buf)?;
        if ref_index >= 0 {
            let obj = interned
                .get(ref_index as usize)
                .cloned()
                .ok_or(FimError::Serializer(SerializerError::InputStreamFormat(
                    "ref_index out of range".into(),
                )))?;
            return Ok((obj, rest));
        }
        let factory = self
            .ref_counted
            .get(&type_id)
            .ok_or(FimError::Serializer(SerializerError::UnknownType(type_id)))?;
        let obj = factory(version, payload)?;
        interned.push(Rc::clone(&obj));
        Ok((obj, rest))
    }

    /// Write a reference-counted object, interning it on first
    /// encounter and writing only the index thereafter (spec.md §4.10).
    pub fn write_ref_counted(
        obj: &Rc<dyn Serializable>,
        interned: &mut Vec<*const ()>,
    ) -> Vec<u8> {
        let ptr = Rc::as_ptr(obj) as *const ();
        if let Some(pos) = interned.iter().position(|&p| p == ptr) {
            return write_frame(obj.canonical_type_name(), obj.version(), pos as i32, &[]);
        }
        interned.push(ptr);
        write_frame(obj.canonical_type_name(), obj.version(), -1, &obj.write_payload())
    }
}

fn write_frame(canonical_name: &str, version: i32, ref_index: i32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + payload.len());
    out.extend_from_slice(&type_id_of(canonical_name).to_le_bytes());
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    out.extend_from_slice(&ref_index.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn read_frame(buf: &[u8]) -> Result<(u32, i32, i32, &[u8], &[u8])> {
    let bad = || FimError::Serializer(SerializerError::InputStreamFormat("truncated frame".into()));
    let (type_id_b, rest) = take(buf, 4).ok_or_else(bad)?;
    let type_id = u32::from_le_bytes(type_id_b.try_into().map_err(|_| bad())?);
    let (version_b, rest) = take(rest, 4).ok_or_else(bad)?;
    let version = i32::from_le_bytes(version_b.try_into().map_err(|_| bad())?);
    let (size_b, rest) = take(rest, 4).ok_or_else(bad)?;
    let size = i32::from_le_bytes(size_b.try_into().map_err(|_| bad())?);
    let (ref_index_b, rest) = take(rest, 4).ok_or_else(bad)?;
    let ref_index = i32::from_le_bytes(ref_index_b.try_into().map_err(|_| bad())?);
    let (payload, rest) = take(rest, size.max(0) as usize).ok_or_else(bad)?;
    Ok((type_id, version, ref_index, payload, rest))
}

fn take(buf: &[u8], n: usize) -> Option<(&[u8], &[u8])> {
    if buf.len() < n {
        None
    } else {
        Some(buf.split_at(n))
    }
}
