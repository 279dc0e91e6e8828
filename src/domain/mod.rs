// Domain layer: the tuple model and the component traits user code implements.

pub mod model;
pub mod ports;
