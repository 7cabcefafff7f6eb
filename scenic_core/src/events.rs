use glam::Vec2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Release,
    Move,
}

/// Pointer input forwarded by the host. `position` is in normalized device
/// coordinates; `target` is the node under the pointer, if the host picked one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouseEvent {
    pub action: MouseAction,
    pub button: u8,
    pub position: Vec2,
    pub target: Option<scenic_ids::NodeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: u32,
    pub pressed: bool,
}
