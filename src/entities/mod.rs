pub mod item_servico;
pub mod movimentacao_estoque;
pub mod ordem_servico;
pub mod peca;

pub use item_servico::ItemType;
pub use movimentacao_estoque::MovementType;
pub use ordem_servico::OrderStatus;
pub use peca::StockStatus;
