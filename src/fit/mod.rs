//! Young-Laplace fitting engine.
//!
//! Responsibilities:
//!
//! - match contour points to the theoretical profile (`nearest`)
//! - assemble residuals and the Jacobian, resumably (`jacobian`)
//! - estimate a starting point (`guess`)
//! - run Levenberg-Marquardt-Fletcher iterations (`lmf`)
//! - drive all of it as a cancellable, observable session (`session`)

pub mod guess;
pub mod jacobian;
pub mod lmf;
pub mod nearest;
pub mod pacer;
pub mod session;
pub mod tolerances;

pub use guess::*;
pub use jacobian::*;
pub use lmf::*;
pub use nearest::*;
pub use pacer::*;
pub use session::*;
pub use tolerances::*;
