pub mod reentrancy;

pub use reentrancy::ReentrancyGuard;
