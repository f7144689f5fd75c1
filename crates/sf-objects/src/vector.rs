//! The per-block scene snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::object::{AudioObject, ObjectId};

/// Id-keyed collection of scene objects.
///
/// Iteration is in ascending id order, which makes every calculator walk the
/// scene deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectVector {
    objects: BTreeMap<ObjectId, AudioObject>,
}

impl ObjectVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the object with the same id.
    pub fn set(&mut self, object: AudioObject) {
        self.objects.insert(object.id, object);
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<AudioObject> {
        self.objects.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&AudioObject> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Objects in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &AudioObject> {
        self.objects.values()
    }
}

impl FromIterator<AudioObject> for ObjectVector {
    fn from_iter<I: IntoIterator<Item = AudioObject>>(iter: I) -> Self {
        let mut vector = Self::new();
        for object in iter {
            vector.set(object);
        }
        vector
    }
}
