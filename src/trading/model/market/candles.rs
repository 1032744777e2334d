extern crate rbatis;

use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};

use crate::app_config::db::get_db_client;
use crate::error::app_error::AppError;
use crate::{CandleItem, CandleItemBuilder};

/// table: candles
///
/// (symbol, timeframe, ts) 上有唯一约束，摄入天然幂等
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct CandlesEntity {
    pub symbol: String,
    pub timeframe: String,
    /// 开始时间，Unix时间戳的毫秒数格式
    pub ts: i64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub vol: f64,
}

impl CandlesEntity {
    pub fn to_item(&self) -> Result<CandleItem, AppError> {
        CandleItemBuilder::new()
            .ts(self.ts)
            .o(self.o)
            .h(self.h)
            .l(self.l)
            .c(self.c)
            .v(self.vol)
            .build()
    }
}

crud!(CandlesEntity {}, "candles");
impl_select!(CandlesEntity{select_recent(symbol:&str, timeframe:&str, limit:usize) =>
    "`where symbol = #{symbol} and timeframe = #{timeframe} order by ts desc limit #{limit}`"}, "candles");

pub struct CandlesModel {
    db: &'static RBatis,
}

impl CandlesModel {
    pub fn new() -> Self {
        Self {
            db: get_db_client(),
        }
    }

    pub async fn create_table(&self) -> Result<(), AppError> {
        let create_table_sql = "CREATE TABLE IF NOT EXISTS `candles` (
            `id` int NOT NULL AUTO_INCREMENT,
            `symbol` varchar(20) NOT NULL,
            `timeframe` varchar(10) NOT NULL,
            `ts` bigint NOT NULL COMMENT '开始时间，Unix时间戳的毫秒数格式',
            `o` double NOT NULL COMMENT '开盘价格',
            `h` double NOT NULL COMMENT '最高价格',
            `l` double NOT NULL COMMENT '最低价格',
            `c` double NOT NULL COMMENT '收盘价格',
            `vol` double NOT NULL COMMENT '交易量',
            `created_at` datetime NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (`id`),
            UNIQUE KEY `uk_symbol_timeframe_ts` (`symbol`, `timeframe`, `ts`)
        ) ENGINE=InnoDB AUTO_INCREMENT=1 DEFAULT CHARSET=utf8mb4;";
        self.db.exec(create_table_sql, vec![]).await?;
        Ok(())
    }

    /// 批量写入K线，依赖唯一键去重（INSERT IGNORE），返回新插入条数
    pub async fn upsert(&self, list: &[CandlesEntity]) -> Result<usize, AppError> {
        if list.is_empty() {
            return Ok(0);
        }
        let mut query = String::from(
            "INSERT IGNORE INTO candles (symbol, timeframe, ts, o, h, l, c, vol) VALUES ",
        );
        let mut params: Vec<rbs::Value> = Vec::new();
        for candle in list {
            query.push_str("(?, ?, ?, ?, ?, ?, ?, ?),");
            params.push(candle.symbol.clone().into());
            params.push(candle.timeframe.clone().into());
            params.push(candle.ts.into());
            params.push(candle.o.into());
            params.push(candle.h.into());
            params.push(candle.l.into());
            params.push(candle.c.into());
            params.push(candle.vol.into());
        }
        // 移除最后一个逗号
        query.pop();
        let res = self.db.exec(&query, params).await?;
        Ok(res.rows_affected as usize)
    }

    /// 最近 limit 根K线，按时间升序返回（newest-last）
    pub async fn recent(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<CandlesEntity>, AppError> {
        let mut rows = CandlesEntity::select_recent(self.db, symbol, timeframe, limit).await?;
        rows.reverse();
        Ok(rows)
    }
}

impl Default for CandlesModel {
    fn default() -> Self {
        Self::new()
    }
}
