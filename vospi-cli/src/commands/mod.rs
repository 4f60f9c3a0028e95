pub mod capture;
pub mod dump;
pub mod replay;
