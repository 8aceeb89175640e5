//! The seven animation-driven protocol teaching simulations: each
//! kernel owns its own `Subject` state and drives its own `Flight`s
//! and/or private `Scheduler`, independent of the others (§4.8, §5).

pub mod frag_demo;
pub mod gbn;
pub mod l2_cast;
pub mod modulation;
pub mod sr;
pub mod tcp_fin;
pub mod tcp_syn;

pub use frag_demo::FragDemo;
pub use gbn::GoBackN;
pub use l2_cast::L2Cast;
pub use modulation::Modulation;
pub use sr::SelectiveRepeat;
pub use tcp_fin::TcpFin;
pub use tcp_syn::TcpSyn;
