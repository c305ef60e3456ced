/*!
 * Replicated master mutations
 *
 * Everything that changes persisted master state goes through the log as a
 * [`MasterMutation`] and is applied identically on every peer by
 * [`MasterAutomaton::apply_mutation`](crate::automaton::MasterAutomaton::apply_mutation).
 */

use serde::{Deserialize, Serialize};

use cellmaster_core_object::{ObjectId, ObjectType};
use cellmaster_object_server::DestroyObjectsRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MasterMutation {
    /// Create an object holding one creation reference
    CreateObject { object_type: ObjectType },

    RefObject { object_id: ObjectId },

    UnrefObject { object_id: ObjectId },

    CreateDataCenter { name: String },

    /// Drop the creation reference of a data center
    RemoveDataCenter { name: String },

    SetNodeDataCenter {
        address: String,
        data_center: Option<String>,
    },

    /// A GC sweep batch
    DestroyObjects(DestroyObjectsRequest),
}

impl MasterMutation {
    pub fn name(&self) -> &'static str {
        match self {
            MasterMutation::CreateObject { .. } => "create_object",
            MasterMutation::RefObject { .. } => "ref_object",
            MasterMutation::UnrefObject { .. } => "unref_object",
            MasterMutation::CreateDataCenter { .. } => "create_data_center",
            MasterMutation::RemoveDataCenter { .. } => "remove_data_center",
            MasterMutation::SetNodeDataCenter { .. } => "set_node_data_center",
            MasterMutation::DestroyObjects(_) => "destroy_objects",
        }
    }
}

impl From<DestroyObjectsRequest> for MasterMutation {
    fn from(request: DestroyObjectsRequest) -> Self {
        MasterMutation::DestroyObjects(request)
    }
}
