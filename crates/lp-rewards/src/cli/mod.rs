pub mod common;
pub mod impls;
pub mod inspect;
pub mod rewards;
pub mod traits;
