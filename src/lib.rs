pub mod app;
pub mod app_config;
pub mod error;
pub mod time_util;
pub mod trading;

use crate::error::app_error::AppError;

/// 内存K线数据项，指标计算与策略评估的统一输入
#[derive(Debug, Clone, PartialEq)]
pub struct CandleItem {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    ts: i64,
}

impl CandleItem {
    pub fn builder() -> CandleItemBuilder {
        CandleItemBuilder::new()
    }

    pub fn ts(&self) -> i64 {
        self.ts
    }

    pub fn o(&self) -> f64 {
        self.o
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    pub fn l(&self) -> f64 {
        self.l
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn v(&self) -> f64 {
        self.v
    }
}

pub struct CandleItemBuilder {
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    v: Option<f64>,
    ts: Option<i64>,
}

impl Default for CandleItemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleItemBuilder {
    pub fn new() -> Self {
        Self {
            o: None,
            h: None,
            l: None,
            c: None,
            v: None,
            ts: None,
        }
    }

    pub fn ts(mut self, val: i64) -> Self {
        self.ts = Some(val);
        self
    }

    pub fn o(mut self, val: f64) -> Self {
        self.o = Some(val);
        self
    }

    pub fn h(mut self, val: f64) -> Self {
        self.h = Some(val);
        self
    }

    pub fn l(mut self, val: f64) -> Self {
        self.l = Some(val);
        self
    }

    pub fn c(mut self, val: f64) -> Self {
        self.c = Some(val);
        self
    }

    pub fn v(mut self, val: f64) -> Self {
        self.v = Some(val);
        self
    }

    pub fn build(self) -> Result<CandleItem, AppError> {
        if let (Some(o), Some(h), Some(l), Some(c), Some(v), Some(ts)) =
            (self.o, self.h, self.l, self.c, self.v, self.ts)
        {
            // validate
            if l <= o && l <= c && l <= h && h >= o && h >= c && v >= 0.0 && l >= 0.0 {
                Ok(CandleItem { o, h, l, c, v, ts })
            } else {
                Err(AppError::DataUnavailable(format!("K线数据不合法: ts={}", ts)))
            }
        } else {
            Err(AppError::DataUnavailable("K线数据字段缺失".to_string()))
        }
    }
}
