//! Nodes driven by the host: `TimeSensor` runs every frame, `TouchSensor`
//! reacts to pointer input on its sibling geometry.

use std::sync::Arc;

use log::warn;
use scenic_core::{
    Access, Capabilities, Environment, Field, MouseAction, MouseEvent, Node, NodeBehavior, NodeRef,
    SingleBool, SingleFloat, SingleTime, Timestamp,
};

fn emit(node: &Node, name: &str, value: &dyn Field) {
    if let Err(err) = node.emit_field(name, value) {
        warn!("{} #{}: {err}", node.type_name(), node.id());
    }
}

/// Produces `fraction_changed` in [0, 1] over each `cycleInterval` between
/// `startTime` and `stopTime`.
pub struct TimeSensor;

impl TimeSensor {
    pub const TYPE: &'static str = "TimeSensor";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("enabled", SingleBool::new(true), Access::GET_SET)
                .register_field("loop", SingleBool::default(), Access::GET_SET)
                .register_field("cycleInterval", SingleTime::new(1.0), Access::GET_SET)
                .register_field("startTime", SingleTime::default(), Access::GET_SET)
                .register_field("stopTime", SingleTime::default(), Access::GET_SET)
                .register_field("isActive", SingleBool::default(), Access::GET)
                .register_field("fraction_changed", SingleFloat::default(), Access::GET)
                .register_field("time", SingleTime::default(), Access::GET);
        });
        Node::create(environment, spec, TimeSensorBehavior)
    }
}

struct TimeSensorBehavior;

/// Where a time sensor stands at one instant.
#[derive(Debug, PartialEq)]
enum Cycle {
    Before,
    Running(f32),
    Finished,
}

impl TimeSensorBehavior {
    fn cycle(node: &Node, now: f64) -> scenic_core::Result<Cycle> {
        let start = node.value::<f64>("startTime")?;
        let stop = node.value::<f64>("stopTime")?;
        let interval = node.value::<f64>("cycleInterval")?;
        let looping = node.value::<bool>("loop")?;

        if now < start || interval <= 0.0 {
            return Ok(Cycle::Before);
        }
        if stop > start && now >= stop {
            return Ok(Cycle::Finished);
        }
        let elapsed = now - start;
        if !looping && elapsed >= interval {
            return Ok(Cycle::Finished);
        }
        Ok(Cycle::Running((elapsed % interval / interval) as f32))
    }
}

impl NodeBehavior for TimeSensorBehavior {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.update()
    }

    fn on_update(&self, node: &Node, timestamp: Timestamp) {
        if !node.value::<bool>("enabled").unwrap_or(false) {
            return;
        }
        let cycle = match Self::cycle(node, timestamp.seconds()) {
            Ok(cycle) => cycle,
            Err(err) => {
                warn!("{} #{}: {err}", node.type_name(), node.id());
                return;
            }
        };
        let active = node.value::<bool>("isActive").unwrap_or(false);
        match cycle {
            Cycle::Before => {}
            Cycle::Running(fraction) => {
                if !active {
                    emit(node, "isActive", &SingleBool::with_timestamp(true, timestamp));
                }
                emit(node, "fraction_changed", &SingleFloat::with_timestamp(fraction, timestamp));
                emit(node, "time", &SingleTime::with_timestamp(timestamp.seconds(), timestamp));
            }
            Cycle::Finished if active => {
                emit(node, "fraction_changed", &SingleFloat::with_timestamp(1.0, timestamp));
                emit(node, "isActive", &SingleBool::with_timestamp(false, timestamp));
            }
            Cycle::Finished => {}
        }
    }
}

/// Reports presses on geometry that shares a parent with the sensor.
pub struct TouchSensor;

impl TouchSensor {
    pub const TYPE: &'static str = "TouchSensor";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("enabled", SingleBool::new(true), Access::GET_SET)
                .register_field("isActive", SingleBool::default(), Access::GET)
                .register_field("touchTime", SingleTime::default(), Access::GET);
        });
        Node::create(environment, spec, TouchSensorBehavior)
    }
}

struct TouchSensorBehavior;

impl TouchSensorBehavior {
    /// True when the picked node sits below one of the sensor's parents.
    fn senses(node: &Node, event: &MouseEvent) -> bool {
        let registry = node.environment().registry();
        let Some(target) = event.target.and_then(|id| registry.node(id)) else {
            return false;
        };
        let ancestors = target.ancestor_nodes();
        node.parents()
            .iter()
            .any(|(parent, _)| ancestors.contains(parent))
    }
}

impl NodeBehavior for TouchSensorBehavior {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.event()
    }

    fn on_mouse_event(&self, node: &Node, event: &MouseEvent) -> bool {
        if !node.value::<bool>("enabled").unwrap_or(false) {
            return false;
        }
        let active = node.value::<bool>("isActive").unwrap_or(false);
        match event.action {
            MouseAction::Press if event.button == 0 && Self::senses(node, event) => {
                emit(node, "isActive", &SingleBool::new(true));
                true
            }
            MouseAction::Release if active => {
                let now = Timestamp::now();
                emit(node, "isActive", &SingleBool::with_timestamp(false, now));
                if Self::senses(node, event) {
                    emit(node, "touchTime", &SingleTime::with_timestamp(now.seconds(), now));
                }
                true
            }
            _ => false,
        }
    }
}
