// Order totals: pure aggregation plus the order/line-item service
pub mod orders;
pub mod totals;

// Stock: pure movement rules, the ledger writer and the parts service
pub mod inventory;
pub mod stock;
pub mod stock_ledger;
