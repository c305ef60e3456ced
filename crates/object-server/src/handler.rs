//! Type handlers
//!
//! The object manager does not own objects. Each object kind lives in its
//! own arena and is reached through a [`TypeHandler`] selected by the type
//! tag embedded in the id.

use cellmaster_core_object::{MasterObject, ObjectId, ObjectTable, ObjectType, ReferenceCounter};

pub trait TypeHandler {
    fn find_ref_counter(&self, id: ObjectId) -> Option<&ReferenceCounter>;

    fn find_ref_counter_mut(&mut self, id: ObjectId) -> Option<&mut ReferenceCounter>;

    /// Remove the object; returns false if it was already gone
    fn destroy_object(&mut self, id: ObjectId) -> bool;
}

/// Maps a type tag to the handler owning objects of that type
pub trait HandlerRegistry {
    fn handler(&self, object_type: ObjectType) -> Option<&dyn TypeHandler>;

    fn handler_mut(&mut self, object_type: ObjectType) -> Option<&mut dyn TypeHandler>;
}

impl<T: MasterObject> TypeHandler for ObjectTable<T> {
    fn find_ref_counter(&self, id: ObjectId) -> Option<&ReferenceCounter> {
        self.find(id).map(|object| object.ref_counter())
    }

    fn find_ref_counter_mut(&mut self, id: ObjectId) -> Option<&mut ReferenceCounter> {
        self.find_mut(id).map(|object| object.ref_counter_mut())
    }

    fn destroy_object(&mut self, id: ObjectId) -> bool {
        self.remove(id).is_some()
    }
}
