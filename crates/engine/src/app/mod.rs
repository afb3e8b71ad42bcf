mod actor;
mod color;
mod controller;
mod engine;
mod geometry;
mod ids;
mod input;
mod loop_runner;
mod message_box;
mod metrics;
mod rendering;
mod scene;
mod surface;
mod text;
mod view;

pub use actor::{Actor, ActorTable};
pub use color::{color_or_transparent, parse_color};
pub use controller::{Controller, FrameClock, Handler, HandlerAction, HandlerTier, Sensitivity};
pub use engine::{Engine, EngineError, FrameContext, GameLogic};
pub use geometry::{Direction, Rect, Vec2};
pub use ids::{ActorId, SceneId, ViewId};
pub use input::{Button, InputSource, InputState};
pub use loop_runner::{run_app, AppError, LoopConfig};
pub use message_box::MESSAGE_BOX_ID;
pub use rendering::{Renderer, Viewport};
pub use scene::Scene;
pub use surface::{Bitmap, Color, Surface, MAX_SURFACE_SIDE, TRANSPARENT};
pub use view::{Camera, Overlay, View};
