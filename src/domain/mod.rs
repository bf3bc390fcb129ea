pub mod ai;
pub mod entity;
pub mod geom;
pub mod grid;
pub mod hazard;
pub mod resolver;
pub mod teleport;
pub mod tile;
