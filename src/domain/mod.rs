// 領域層：item、查詢，以及來源與傳輸層的 port

pub mod model;
pub mod ports;
