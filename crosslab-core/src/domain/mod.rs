//! Domain types: panels, weights, positions, portfolio snapshots, fills.

pub mod order;
pub mod panel;
pub mod portfolio;
pub mod position;
pub mod weights;

pub use order::{EquityPoint, FillReport, OrderSide, OrderStatus, TradeRecord};
pub use panel::{AssetDay, CrossSection, Panel, PanelError};
pub use portfolio::PortfolioSnapshot;
pub use position::Position;
pub use weights::WeightVec;
