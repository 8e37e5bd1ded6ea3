//! Explicit verb -> opcode mapping table (SPEC_FULL.md §10.5), grounded
//! on `lib/rapi/connector.py`'s `CONNECTOR` dict and `lib/rapi/baserlib.py`'s
//! `OpcodeResource` base class, reimplemented as a Rust trait rather than
//! scattering the mapping across per-endpoint macros.

use axum::http::Method;

/// One RAPI resource: a path pattern plus, per HTTP verb, the opcode
/// kind it submits (or `None` for pure reads that don't go through the
/// job queue, e.g. `/2/info`).
pub struct RapiResource {
    pub path: &'static str,
    pub get_opcode: Option<&'static str>,
    pub post_opcode: Option<&'static str>,
    pub put_opcode: Option<&'static str>,
    pub delete_opcode: Option<&'static str>,
}

impl RapiResource {
    pub fn opcode_for(&self, method: &Method) -> Option<&'static str> {
        match *method {
            Method::GET => self.get_opcode,
            Method::POST => self.post_opcode,
            Method::PUT => self.put_opcode,
            Method::DELETE => self.delete_opcode,
            _ => None,
        }
    }
}

/// The resource table (SPEC_FULL.md §6): a representative subset
/// covering nodes, instances, jobs, groups, tags.
pub const CONNECTOR: &[RapiResource] = &[
    RapiResource { path: "/2/jobs/{id}", get_opcode: None, post_opcode: None, put_opcode: None, delete_opcode: Some("OP_JOB_CANCEL") },
    RapiResource { path: "/2/groups", get_opcode: None, post_opcode: Some("OP_GROUP_ADD"), put_opcode: None, delete_opcode: None },
    RapiResource { path: "/2/groups/{name}", get_opcode: None, post_opcode: None, put_opcode: Some("OP_GROUP_SET_PARAMS"), delete_opcode: Some("OP_GROUP_REMOVE") },
    RapiResource { path: "/2/groups/{name}/assign-nodes", get_opcode: None, post_opcode: Some("OP_GROUP_ASSIGN_NODES"), put_opcode: None, delete_opcode: None },
    RapiResource { path: "/2/nodes", get_opcode: None, post_opcode: None, put_opcode: None, delete_opcode: None },
    RapiResource { path: "/2/nodes/{name}/role", get_opcode: None, post_opcode: None, put_opcode: Some("OP_NODE_SET_PARAMS"), delete_opcode: None },
    RapiResource { path: "/2/instances", get_opcode: None, post_opcode: Some("OP_INSTANCE_CREATE"), put_opcode: None, delete_opcode: None },
    RapiResource { path: "/2/instances/{name}", get_opcode: None, post_opcode: None, put_opcode: None, delete_opcode: Some("OP_INSTANCE_REMOVE") },
    RapiResource { path: "/2/instances/{name}/reboot", get_opcode: None, post_opcode: Some("OP_INSTANCE_REBOOT"), put_opcode: None, delete_opcode: None },
    RapiResource { path: "/2/instances/{name}/migrate", get_opcode: None, post_opcode: Some("OP_INSTANCE_MIGRATE"), put_opcode: None, delete_opcode: None },
    RapiResource { path: "/2/tags", get_opcode: None, post_opcode: Some("OP_TAGS_SET"), put_opcode: None, delete_opcode: Some("OP_TAGS_DEL") },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_post_maps_to_group_add() {
        let groups = CONNECTOR.iter().find(|r| r.path == "/2/groups").unwrap();
        assert_eq!(groups.opcode_for(&Method::POST), Some("OP_GROUP_ADD"));
        assert_eq!(groups.opcode_for(&Method::GET), None);
    }
}
