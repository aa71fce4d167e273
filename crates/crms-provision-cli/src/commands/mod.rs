pub mod stage3;
