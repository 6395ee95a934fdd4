#![forbid(unsafe_code)]

//! Tracked data nodes.
//!
//! A [`TraxObject`] is a shared handle on an object, array or dictionary
//! node. Reads made while a processor is running register
//! `(object id, field)` dependencies on that processor; writes notify the
//! processors listening on the written field.
//!
//! # Invariants
//!
//! 1. A node carries tracking metadata iff it is live. Disposal detaches the
//!    metadata and the node keeps working as a plain, untracked container.
//! 2. Writing the value a field already holds is a no-op: no `!SET`, no
//!    notification.
//! 3. The size pseudo-field ([`DICT_SIZE`]) changes only when a key is added
//!    or removed. Setting a key to [`Value::Undefined`] keeps it.
//! 4. A field written by a processor is owned by it; other processors writing
//!    the field are rejected until the owner is disposed.
//! 5. Nested plain objects and arrays are wrapped on first read, unless the
//!    field's wrap level is 1.
//!
//! No `RefCell` borrow is held while events are logged or processors are
//! notified.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use crate::error::TraxError;
use crate::processor::{Processor, ProcessorInner};
use crate::runtime::{Runtime, Trax, TraxObjectType};
use crate::stream::TraxEvent;
use crate::value::Value;

/// Pseudo-field read by key enumeration and size queries.
pub const DICT_SIZE: &str = "☆trax.dictionary.size☆";

/// Array length field.
pub const LENGTH: &str = "length";

/// Largest array length a node accepts.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Shape of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Object,
    Array,
    Dictionary,
}

impl ObjectKind {
    pub const fn as_str(self) -> &'static str {
        self.trax_type().as_str()
    }

    pub const fn trax_type(self) -> TraxObjectType {
        match self {
            Self::Object => TraxObjectType::Object,
            Self::Array => TraxObjectType::Array,
            Self::Dictionary => TraxObjectType::Dictionary,
        }
    }
}

/// Field name to wrap level.
pub(crate) type RefFields = Rc<AHashMap<String, u8>>;

enum NodeData {
    Map(IndexMap<String, Value>),
    List(Vec<Value>),
}

impl NodeData {
    /// Arrays become lists; anything else a map (empty unless an object).
    fn from_json(json: Json, kind: Option<ObjectKind>) -> (ObjectKind, Self) {
        match json {
            Json::Array(items) => (
                ObjectKind::Array,
                Self::List(items.into_iter().map(Value::from).collect()),
            ),
            Json::Object(fields) => (
                match kind {
                    Some(ObjectKind::Dictionary) => ObjectKind::Dictionary,
                    _ => ObjectKind::Object,
                },
                Self::Map(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
            ),
            _ => (ObjectKind::Object, Self::Map(IndexMap::new())),
        }
    }
}

struct NodeMeta {
    listeners: IndexMap<String, Weak<ProcessorInner>>,
    computed_props: AHashMap<String, String>,
    computed_content: Option<String>,
    content_processors: Vec<Processor>,
    aw_level: u8,
    ref_fields: RefFields,
    dict_size: usize,
}

pub(crate) struct NodeInner {
    rt: Rc<Runtime>,
    id: String,
    store_id: String,
    kind: ObjectKind,
    data: RefCell<NodeData>,
    meta: RefCell<Option<NodeMeta>>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        if self.meta.get_mut().is_some() {
            self.rt.forget_object(&self.id);
        }
    }
}

/// Handle on a tracked node. Clones share the node; equality is identity.
#[derive(Clone)]
pub struct TraxObject {
    pub(crate) inner: Rc<NodeInner>,
}

impl PartialEq for TraxObject {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TraxObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraxObject")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("live", &self.is_live())
            .finish()
    }
}

impl TraxObject {
    /// Build, register and announce (`!NEW`) a node.
    pub(crate) fn create(
        rt: &Rc<Runtime>,
        id: String,
        store_id: String,
        json: Json,
        kind: Option<ObjectKind>,
        aw_level: u8,
        ref_fields: RefFields,
    ) -> Self {
        let (kind, data) = NodeData::from_json(json, kind);
        let dict_size = match &data {
            NodeData::Map(map) => map.len(),
            NodeData::List(_) => 0,
        };
        let node = Self {
            inner: Rc::new(NodeInner {
                rt: Rc::clone(rt),
                id,
                store_id,
                kind,
                data: RefCell::new(data),
                meta: RefCell::new(Some(NodeMeta {
                    listeners: IndexMap::new(),
                    computed_props: AHashMap::new(),
                    computed_content: None,
                    content_processors: Vec::new(),
                    aw_level,
                    ref_fields,
                    dict_size,
                })),
            }),
        };
        rt.register_object(&node);
        rt.emit(
            TraxEvent::New,
            serde_json::json!({ "objectId": node.inner.id, "objectType": kind.as_str() }),
        );
        node
    }

    /// Untracked node, returned by operations on disposed stores.
    pub(crate) fn detached(rt: &Rc<Runtime>, json: Json) -> Self {
        let (kind, data) = NodeData::from_json(json, None);
        Self {
            inner: Rc::new(NodeInner {
                rt: Rc::clone(rt),
                id: String::new(),
                store_id: String::new(),
                kind,
                data: RefCell::new(data),
                meta: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<NodeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<NodeInner> {
        Rc::downgrade(&self.inner)
    }

    // ── Identity ─────────────────────────────────────────────────────

    /// Unique id (`store/id`, `parent*field`, ...). Empty for detached nodes.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn store_id(&self) -> &str {
        &self.inner.store_id
    }

    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.inner.kind
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.inner.kind == ObjectKind::Array
    }

    /// Whether the node is still tracked.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.meta.borrow().is_some()
    }

    /// Runtime owning the node.
    #[must_use]
    pub fn trax(&self) -> Trax {
        Trax::from_runtime(Rc::clone(&self.inner.rt))
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Read a field (array slots by decimal index, `"length"` for the
    /// array length).
    pub fn get(&self, key: &str) -> Value {
        self.before_read();
        let raw = self.load(key);
        let value = self.materialize(key, raw);
        self.track(key, &value);
        value
    }

    /// Read a field holding a node.
    pub fn get_object(&self, key: &str) -> Option<TraxObject> {
        self.get(key).into_object()
    }

    pub fn get_index(&self, index: usize) -> Value {
        self.get(&index.to_string())
    }

    /// Whether the field exists. Tracked on the field.
    pub fn contains_key(&self, key: &str) -> bool {
        self.before_read();
        let found = match &*self.inner.data.borrow() {
            NodeData::Map(map) => map.contains_key(key),
            NodeData::List(list) => key.parse::<usize>().is_ok_and(|i| i < list.len()),
        };
        self.track(key, &Value::Bool(found));
        found
    }

    /// Array length or number of keys.
    pub fn len(&self) -> usize {
        match self.inner.kind {
            ObjectKind::Array => {
                self.before_read();
                let len = self.raw_len();
                self.track(LENGTH, &Value::from(len));
                len
            }
            _ => self.dict_size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys, tracked on [`DICT_SIZE`].
    pub fn dict_size(&self) -> usize {
        if self.is_array() {
            return self.len();
        }
        self.before_read();
        let size = match self.inner.meta.borrow().as_ref() {
            Some(meta) => meta.dict_size,
            None => self.raw_len(),
        };
        self.track(DICT_SIZE, &Value::from(size));
        size
    }

    /// Field names (array indices for arrays), tracked on the size.
    pub fn keys(&self) -> Vec<String> {
        self.before_read();
        let (keys, size_key) = match &*self.inner.data.borrow() {
            NodeData::Map(map) => (map.keys().cloned().collect::<Vec<_>>(), DICT_SIZE),
            NodeData::List(list) => ((0..list.len()).map(|i| i.to_string()).collect(), LENGTH),
        };
        self.track(size_key, &Value::from(keys.len()));
        keys
    }

    /// Key/value pairs; each value read is tracked.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .map(|k| {
                let v = self.get(&k);
                (k, v)
            })
            .collect()
    }

    /// Array slots, each read tracked.
    pub fn values(&self) -> Vec<Value> {
        if !self.is_array() {
            return self.entries().into_iter().map(|(_, v)| v).collect();
        }
        (0..self.len()).map(|i| self.get_index(i)).collect()
    }

    /// Untracked deep snapshot.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match &*self.inner.data.borrow() {
            NodeData::Map(map) => Json::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            NodeData::List(list) => Json::Array(list.iter().map(Value::to_json).collect()),
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write a field. On arrays, `key` is an index or `"length"`.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.is_array() {
            if key == LENGTH {
                let len = value.as_f64().unwrap_or_default().max(0.0);
                if len > MAX_ARRAY_LENGTH as f64 {
                    self.report_length(len);
                    return;
                }
                self.resize(len as usize);
            } else if let Ok(index) = key.parse::<usize>() {
                self.set_index(index, value);
            }
            return;
        }
        self.write_field(key, value);
    }

    /// Remove a field. On arrays the slot is cleared and the length kept.
    /// Returns whether something was removed.
    pub fn delete(&self, key: &str) -> bool {
        if self.is_array() {
            let Ok(index) = key.parse::<usize>() else {
                return false;
            };
            if index >= self.raw_len() {
                return false;
            }
            self.write_slot(index, Value::Undefined);
            return true;
        }
        if !self.claim_prop(key) {
            return false;
        }
        let removed = match &mut *self.inner.data.borrow_mut() {
            NodeData::Map(map) => map.shift_remove(key),
            NodeData::List(_) => None,
        };
        let Some(from) = removed else {
            return false;
        };
        let live = self.adjust_size(false);
        if live {
            self.log_set(key, &from, &Value::Undefined);
            self.notify(key);
            self.notify(DICT_SIZE);
        }
        true
    }

    /// Write slot `index`, growing the array as needed. Indices past
    /// [`MAX_ARRAY_LENGTH`] are reported and ignored.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        if index >= MAX_ARRAY_LENGTH {
            self.report_length(index as f64 + 1.0);
            return;
        }
        let from = self.raw_len();
        self.write_slot(index, value.into());
        self.length_changed(from, self.raw_len());
    }

    /// Append to an array; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let index = self.raw_len();
        self.set_index(index, value);
        self.raw_len()
    }

    /// Remove the last slot.
    pub fn pop(&self) -> Value {
        let len = self.raw_len();
        if len == 0 {
            return Value::Undefined;
        }
        let last = self.load(&(len - 1).to_string());
        self.truncate(len - 1);
        last
    }

    /// Insert at `index` (clamped), shifting later slots.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let mut values = self.raw_values();
        values.insert(index.min(values.len()), value.into());
        self.rewrite(values);
    }

    /// Remove the slot at `index`, shifting later slots.
    pub fn remove(&self, index: usize) -> Value {
        let mut values = self.raw_values();
        if index >= values.len() {
            return Value::Undefined;
        }
        let removed = values.remove(index);
        self.rewrite(values);
        removed
    }

    /// Clear slots from `len` on, then shorten the array.
    pub fn truncate(&self, len: usize) {
        let from = self.raw_len();
        if len >= from {
            return;
        }
        for index in len..from {
            self.write_slot(index, Value::Undefined);
        }
        if let NodeData::List(list) = &mut *self.inner.data.borrow_mut() {
            list.truncate(len);
        }
        self.length_changed(from, len);
    }

    // ── Content replacement ──────────────────────────────────────────

    /// Rewrite an array in place, slot by slot.
    pub(crate) fn update_list(&self, values: Vec<Value>) {
        self.claim_content();
        self.rewrite(values);
    }

    /// Replace the entries of an object in place.
    pub(crate) fn update_map(&self, entries: Vec<(String, Value)>) {
        self.claim_content();
        let keep: HashSet<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        let stale: Vec<String> = match &*self.inner.data.borrow() {
            NodeData::Map(map) => map
                .keys()
                .filter(|k| !keep.contains(k.as_str()))
                .cloned()
                .collect(),
            NodeData::List(_) => Vec::new(),
        };
        for key in stale {
            self.delete(&key);
        }
        for (key, value) in entries {
            self.write_field(&key, value);
        }
    }

    fn rewrite(&self, values: Vec<Value>) {
        let from = self.raw_len();
        let len = values.len();
        for (index, value) in values.into_iter().enumerate() {
            self.write_slot(index, value);
        }
        if len < from {
            for index in len..from {
                self.write_slot(index, Value::Undefined);
            }
            if let NodeData::List(list) = &mut *self.inner.data.borrow_mut() {
                list.truncate(len);
            }
        }
        self.length_changed(from, self.raw_len());
    }

    fn resize(&self, len: usize) {
        let from = self.raw_len();
        if len < from {
            self.truncate(len);
        } else if len > from {
            if let NodeData::List(list) = &mut *self.inner.data.borrow_mut() {
                list.resize(len, Value::Undefined);
            }
            self.length_changed(from, len);
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn raw_len(&self) -> usize {
        match &*self.inner.data.borrow() {
            NodeData::Map(map) => map.len(),
            NodeData::List(list) => list.len(),
        }
    }

    fn raw_values(&self) -> Vec<Value> {
        match &*self.inner.data.borrow() {
            NodeData::Map(map) => map.values().cloned().collect(),
            NodeData::List(list) => list.clone(),
        }
    }

    fn load(&self, key: &str) -> Value {
        match &*self.inner.data.borrow() {
            NodeData::Map(map) => map.get(key).cloned().unwrap_or_default(),
            NodeData::List(list) if key == LENGTH => Value::from(list.len()),
            NodeData::List(list) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| list.get(i))
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Wrap a plain object or array read from `key`, in place.
    fn materialize(&self, key: &str, raw: Value) -> Value {
        if !raw.is_wrappable() {
            return raw;
        }
        let (level, ref_fields) = match self.inner.meta.borrow().as_ref() {
            Some(meta) => (
                meta.ref_fields.get(key).copied().unwrap_or(meta.aw_level),
                Rc::clone(&meta.ref_fields),
            ),
            None => return raw,
        };
        if level == 1 {
            return raw;
        }
        let json = match raw {
            Value::Data(json) => json,
            other => return other,
        };
        let rt = &self.inner.rt;
        let id = rt.unique_object_id(&format!("{}*{}", self.inner.id, key));
        let child = TraxObject::create(
            rt,
            id,
            self.inner.store_id.clone(),
            json,
            None,
            level.saturating_sub(1),
            ref_fields,
        );
        let value = Value::Object(child);
        match &mut *self.inner.data.borrow_mut() {
            NodeData::Map(map) => {
                if let Some(slot) = map.get_mut(key) {
                    *slot = value.clone();
                }
            }
            NodeData::List(list) => {
                if let Some(slot) = key.parse::<usize>().ok().and_then(|i| list.get_mut(i)) {
                    *slot = value.clone();
                }
            }
        }
        value
    }

    fn write_field(&self, key: &str, value: Value) {
        if !self.claim_prop(key) {
            return;
        }
        let (from, added) = match &mut *self.inner.data.borrow_mut() {
            NodeData::Map(map) => match map.get_mut(key) {
                Some(slot) if *slot == value => return,
                Some(slot) => (std::mem::replace(slot, value.clone()), false),
                None if value.is_undefined() => return,
                None => {
                    map.insert(key.to_owned(), value.clone());
                    (Value::Undefined, true)
                }
            },
            NodeData::List(_) => return,
        };
        let live = if added {
            self.adjust_size(true)
        } else {
            self.is_live()
        };
        if live {
            self.log_set(key, &from, &value);
            self.notify(key);
            if added {
                self.notify(DICT_SIZE);
            }
        }
    }

    fn write_slot(&self, index: usize, value: Value) {
        let key = index.to_string();
        if !self.claim_prop(&key) {
            return;
        }
        let from = match &mut *self.inner.data.borrow_mut() {
            NodeData::List(list) if index < list.len() => {
                if list[index] == value {
                    return;
                }
                std::mem::replace(&mut list[index], value.clone())
            }
            NodeData::List(list) => {
                list.resize(index + 1, Value::Undefined);
                if value.is_undefined() {
                    return;
                }
                list[index] = value.clone();
                Value::Undefined
            }
            NodeData::Map(_) => return,
        };
        if self.is_live() {
            self.log_set(&key, &from, &value);
            self.notify(&key);
        }
    }

    fn report_length(&self, length: f64) {
        self.inner.rt.report(TraxError::InvalidArrayLength {
            object_id: self.inner.id.clone(),
            length,
        });
    }

    fn length_changed(&self, from: usize, to: usize) {
        if from != to && self.is_live() {
            self.log_set(LENGTH, &Value::from(from), &Value::from(to));
            self.notify(LENGTH);
        }
    }

    /// Update the cached size; returns whether the node is live.
    fn adjust_size(&self, added: bool) -> bool {
        match self.inner.meta.borrow_mut().as_mut() {
            Some(meta) => {
                if added {
                    meta.dict_size += 1;
                } else {
                    meta.dict_size = meta.dict_size.saturating_sub(1);
                }
                true
            }
            None => false,
        }
    }

    /// Run dirty lazy processors attached to this node.
    fn before_read(&self) {
        let dirty: Vec<Processor> = match self.inner.meta.borrow().as_ref() {
            Some(meta) => meta
                .content_processors
                .iter()
                .filter(|p| p.is_dirty())
                .cloned()
                .collect(),
            None => return,
        };
        for processor in dirty {
            processor.compute_on_read();
        }
    }

    fn track(&self, key: &str, value: &Value) {
        if !self.is_live() {
            return;
        }
        let rt = &self.inner.rt;
        let Some(processor) = rt.active_processor() else {
            return;
        };
        processor.add_dependency(self, key);
        if rt.config.log_reads {
            let mut data = Map::new();
            data.insert("objectId".into(), Json::String(self.inner.id.clone()));
            data.insert("propName".into(), Json::String(key.to_owned()));
            if let Some(v) = value.log_repr() {
                data.insert("value".into(), v);
            }
            rt.emit(TraxEvent::Get, Json::Object(data));
        }
    }

    /// Check and record ownership of `key` by the active processor.
    fn claim_prop(&self, key: &str) -> bool {
        let rt = &self.inner.rt;
        let Some(processor) = rt.active_processor() else {
            return true;
        };
        let conflict = {
            let mut meta = self.inner.meta.borrow_mut();
            let Some(meta) = meta.as_mut() else {
                return true;
            };
            match meta.computed_props.get(key) {
                Some(owner) if owner != processor.id() => Some(owner.clone()),
                Some(_) => None,
                None => {
                    meta.computed_props
                        .insert(key.to_owned(), processor.id().to_owned());
                    processor.own_prop(self, key);
                    None
                }
            }
        };
        match conflict {
            Some(owner) => {
                rt.report(TraxError::ComputedPropertyConflict {
                    object_id: self.inner.id.clone(),
                    prop: key.to_owned(),
                    owner,
                });
                false
            }
            None => true,
        }
    }

    fn claim_content(&self) {
        let rt = &self.inner.rt;
        let Some(processor) = rt.active_processor() else {
            return;
        };
        let conflict = {
            let mut meta = self.inner.meta.borrow_mut();
            let Some(meta) = meta.as_mut() else {
                return;
            };
            match &meta.computed_content {
                Some(owner) if owner != processor.id() => Some(owner.clone()),
                Some(_) => None,
                None => {
                    meta.computed_content = Some(processor.id().to_owned());
                    processor.own_content(self);
                    None
                }
            }
        };
        if let Some(owner) = conflict {
            rt.report(TraxError::ComputedContentConflict {
                object_id: self.inner.id.clone(),
                owner,
            });
        }
    }

    fn log_set(&self, key: &str, from: &Value, to: &Value) {
        let mut data = Map::new();
        data.insert("objectId".into(), Json::String(self.inner.id.clone()));
        data.insert("propName".into(), Json::String(key.to_owned()));
        if let Some(v) = from.log_repr() {
            data.insert("fromValue".into(), v);
        }
        if let Some(v) = to.log_repr() {
            data.insert("toValue".into(), v);
        }
        self.inner.rt.emit(TraxEvent::Set, Json::Object(data));
    }

    fn notify(&self, key: &str) {
        let listeners: Vec<Processor> = match self.inner.meta.borrow().as_ref() {
            Some(meta) => meta
                .listeners
                .values()
                .filter_map(Weak::upgrade)
                .map(Processor::from_inner)
                .collect(),
            None => return,
        };
        for processor in listeners {
            processor.notify_change(&self.inner.id, key);
        }
    }

    // ── Processor bookkeeping ────────────────────────────────────────

    pub(crate) fn add_listener(&self, processor: &Processor) {
        if let Some(meta) = self.inner.meta.borrow_mut().as_mut() {
            meta.listeners
                .entry(processor.id().to_owned())
                .or_insert_with(|| processor.downgrade());
        }
    }

    pub(crate) fn remove_listener(&self, processor_id: &str) {
        if let Some(meta) = self.inner.meta.borrow_mut().as_mut() {
            meta.listeners.shift_remove(processor_id);
        }
    }

    pub(crate) fn release_prop(&self, key: &str, processor_id: &str) {
        if let Some(meta) = self.inner.meta.borrow_mut().as_mut() {
            if meta.computed_props.get(key).is_some_and(|o| o == processor_id) {
                meta.computed_props.remove(key);
            }
        }
    }

    pub(crate) fn release_content(&self, processor_id: &str) {
        if let Some(meta) = self.inner.meta.borrow_mut().as_mut() {
            if meta.computed_content.as_deref() == Some(processor_id) {
                meta.computed_content = None;
            }
        }
    }

    pub(crate) fn attach_content_processor(&self, processor: Processor) {
        if let Some(meta) = self.inner.meta.borrow_mut().as_mut() {
            meta.content_processors.push(processor);
        }
    }

    /// Owner of a computed field, if any.
    #[must_use]
    pub fn computed_prop_owner(&self, key: &str) -> Option<String> {
        self.inner
            .meta
            .borrow()
            .as_ref()
            .and_then(|m| m.computed_props.get(key).cloned())
    }

    /// Detach metadata, dispose content processors and log `!DEL`.
    pub(crate) fn dispose(&self) -> bool {
        let Some(meta) = self.inner.meta.borrow_mut().take() else {
            return false;
        };
        for processor in meta.content_processors {
            processor.dispose();
        }
        let rt = &self.inner.rt;
        rt.unregister_object(self);
        rt.emit(
            TraxEvent::Dispose,
            serde_json::json!({ "objectId": self.inner.id }),
        );
        tracing::trace!(target: "trax", object_id = %self.inner.id, "object disposed");
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
