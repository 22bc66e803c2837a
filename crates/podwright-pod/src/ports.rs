//! Deterministic port assignment for step containers
//!
//! Steps receive consecutive ports starting at the configured base, in
//! declaration order. The control container always uses the reserved
//! control port, which lies outside the step range.

use podwright_common::{ControllerConfig, Error, Result};

/// Hands out step ports from a contiguous range
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortAllocator {
    base: u16,
    capacity: u16,
    control_port: u16,
}

impl PortAllocator {
    /// Allocator over `base..base + capacity` with a reserved control port
    pub fn new(base: u16, capacity: u16, control_port: u16) -> Self {
        Self {
            base,
            capacity,
            control_port,
        }
    }

    /// Allocator using the configured range
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.step_port_base,
            config.step_port_capacity,
            config.control_port,
        )
    }

    /// Port of the control container, independent of step count
    pub fn reserved_control_port(&self) -> u16 {
        self.control_port
    }

    /// Assign `base + n` to the nth step id
    pub fn allocate<S: AsRef<str>>(&self, step_ids: &[S]) -> Result<PortAssignment> {
        if step_ids.len() > usize::from(self.capacity) {
            return Err(Error::PortRangeExhausted {
                requested: step_ids.len(),
                capacity: self.capacity,
            });
        }

        let mut steps = Vec::with_capacity(step_ids.len());
        for (offset, id) in (0u16..).zip(step_ids) {
            let port = self.base.checked_add(offset).ok_or(Error::PortRangeExhausted {
                requested: step_ids.len(),
                capacity: self.capacity,
            })?;
            steps.push((id.as_ref().to_string(), port));
        }

        Ok(PortAssignment {
            steps,
            control_port: self.control_port,
        })
    }
}

/// Step id to port, in step order, plus the control port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortAssignment {
    steps: Vec<(String, u16)>,
    control_port: u16,
}

impl PortAssignment {
    /// Port assigned to a step
    pub fn get(&self, step_id: &str) -> Option<u16> {
        self.steps
            .iter()
            .find(|(id, _)| id == step_id)
            .map(|(_, port)| *port)
    }

    /// Reserved control port
    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    /// Step assignments in step order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.steps.iter().map(|(id, port)| (id.as_str(), *port))
    }

    /// Number of step ports handed out
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when no steps were assigned
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
