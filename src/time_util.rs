use chrono::{TimeZone, Utc};

/// 当前UTC毫秒时间戳
pub fn now_mills() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn mill_time_to_datetime(timestamp_ms: i64) -> Result<String, String> {
    // 将毫秒级时间戳转换为 DateTime<Utc>
    match Utc.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(datetime) => {
            let formatted_datetime = datetime.format("%Y-%m-%d %H:%M:%S").to_string();
            Ok(formatted_datetime)
        }
        chrono::LocalResult::None => Err("Invalid timestamp: None".to_string()),
        chrono::LocalResult::Ambiguous(_, _) => Err("Invalid timestamp: Ambiguous".to_string()),
    }
}

/// 两个毫秒时间戳之间经过的小时数
pub fn hours_between(start_ms: i64, end_ms: i64) -> f64 {
    (end_ms - start_ms) as f64 / 3_600_000.0
}
