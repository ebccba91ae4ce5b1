pub mod session;
pub mod state;

pub mod prelude {
    pub use super::{
        session::{Actor, Session},
        state::AppState,
    };
}
