pub mod gc;
pub mod heap;
pub mod value;
