//! Test builders shared across crates (`test-support` feature).

use crate::descriptor::{WorkerDescriptor, WorkerKind};
use crate::id::{InstanceId, Token, WorkerName};
use crate::instance::{Instance, InstanceState};

/// Build a [`WorkerDescriptor`] with sane test defaults.
pub struct DescriptorBuilder {
    name: String,
    title: String,
    cmd: String,
}

impl Default for DescriptorBuilder {
    fn default() -> Self {
        Self { name: "test.wait".into(), title: "Wait".into(), cmd: "sleep 0".into() }
    }
}

impl DescriptorBuilder {
    crate::setters! {
        into { name: String, title: String, cmd: String }
    }

    pub fn build(self) -> WorkerDescriptor {
        WorkerDescriptor {
            name: WorkerName::parse(self.name).expect("test worker name must be valid"),
            title: self.title,
            desc: String::new(),
            mtime: 0,
            kind: WorkerKind::Declarative { cmd: self.cmd },
        }
    }
}

/// Build an [`Instance`] in an arbitrary state for handler-level tests.
pub struct InstanceBuilder {
    id: u64,
    name: String,
    state: InstanceState,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self { id: 1, name: "test.wait".into(), state: InstanceState::Starting }
    }
}

impl InstanceBuilder {
    crate::setters! {
        into { name: String }
        set { id: u64, state: InstanceState }
    }

    pub fn build(self) -> Instance {
        let mut inst = Instance::new(
            InstanceId::new(self.id),
            WorkerName::parse(self.name).expect("test worker name must be valid"),
            0,
            Token::generate(),
        );
        inst.state = self.state;
        inst
    }
}
