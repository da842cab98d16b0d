//! 标定采集记录
//!
//! 每次扫描每个发射源一行：
//!
//! ```text
//! pos;n;name;id;RSSI
//! 3;1;Hotel-Guest;a4:2b:b0:11:22:33;-67
//! ```
//!
//! 名称列可能含有分号，因此前两列从左切分，后两列从右切分。

use regex::Regex;
use tracing::debug;

use crate::algorithms::estimator::Reading;
use crate::error::RecordError;

/// 记录文件的表头
pub const SURVEY_HEADER: &str = "pos;n;name;id;RSSI";

/// 一条采集记录
#[derive(Clone, Debug, PartialEq)]
pub struct SurveyRecord {
    /// 采集位置
    pub position: f64,
    /// 本次扫描中的序号
    pub index: u32,
    /// 发射源名称（SSID）
    pub name: String,
    /// 发射源标识（BSSID）
    pub emitter_id: String,
    /// 信号强度 (dBm)
    pub signal: f64,
}

impl SurveyRecord {
    pub fn new(position: f64, emitter_id: impl Into<String>, signal: f64) -> Self {
        SurveyRecord {
            position,
            index: 0,
            name: String::new(),
            emitter_id: emitter_id.into(),
            signal,
        }
    }

    /// 输出为一行文本（不含换行）
    pub fn to_line(&self) -> String {
        format!(
            "{};{};{};{};{}",
            self.position, self.index, self.name, self.emitter_id, self.signal
        )
    }

    /// 转为实时定位用的读数
    pub fn reading(&self) -> Reading {
        Reading::new(self.emitter_id.clone(), self.signal)
    }
}

/// 采集记录解析器，可按名称正则过滤发射源
#[derive(Clone, Debug, Default)]
pub struct SurveyLog {
    name_filter: Option<Regex>,
}

impl SurveyLog {
    pub fn new() -> Self {
        SurveyLog { name_filter: None }
    }

    /// 只保留名称匹配 `pattern` 的发射源，例如 `^Hotel`
    pub fn with_name_filter(pattern: &str) -> Result<Self, regex::Error> {
        Ok(SurveyLog {
            name_filter: Some(Regex::new(pattern)?),
        })
    }

    /// 解析整段文本
    ///
    /// 非可打印字符被丢弃，空行和表头行被跳过。
    pub fn parse(&self, text: &str) -> Result<Vec<SurveyRecord>, RecordError> {
        let mut records = Vec::new();

        for (number, raw) in text.lines().enumerate() {
            let line: String = raw.chars().filter(|c| (' '..='\x7f').contains(c)).collect();
            if line.trim().is_empty() {
                continue;
            }

            let record = match parse_line(&line, number + 1)? {
                Some(record) => record,
                None => continue,
            };

            if let Some(filter) = &self.name_filter {
                if !filter.is_match(&record.name) {
                    debug!(line = number + 1, name = %record.name, "record filtered by name");
                    continue;
                }
            }

            records.push(record);
        }

        Ok(records)
    }

    /// 把记录写成带表头的文本
    pub fn render(records: &[SurveyRecord]) -> String {
        let mut out = String::from(SURVEY_HEADER);
        out.push('\n');
        for record in records {
            out.push_str(&record.to_line());
            out.push('\n');
        }
        out
    }
}

/// 解析单行，表头返回 None
fn parse_line(line: &str, number: usize) -> Result<Option<SurveyRecord>, RecordError> {
    let malformed = || RecordError::Malformed {
        line: number,
        content: line.to_string(),
    };

    let mut tail = line.rsplitn(3, ';');
    let signal = tail.next().ok_or_else(malformed)?;
    let emitter_id = tail.next().ok_or_else(malformed)?;
    let head = tail.next().ok_or_else(malformed)?;

    let mut front = head.splitn(3, ';');
    let position = front.next().ok_or_else(malformed)?;
    let index = front.next().ok_or_else(malformed)?;
    let name = front.next().ok_or_else(malformed)?;

    if emitter_id.trim() == "id" {
        return Ok(None);
    }

    Ok(Some(SurveyRecord {
        position: number_field(position, "pos", number)?,
        index: index.trim().parse().map_err(|_| RecordError::InvalidNumber {
            line: number,
            field: "n",
            value: index.to_string(),
        })?,
        name: name.to_string(),
        emitter_id: emitter_id.trim().to_string(),
        signal: number_field(signal, "RSSI", number)?,
    }))
}

fn number_field(value: &str, field: &'static str, line: usize) -> Result<f64, RecordError> {
    value.trim().parse::<f64>().map_err(|_| RecordError::InvalidNumber {
        line,
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_header_and_blank_lines() {
        let text = "pos;n;name;id;RSSI\r\n3;1;Hotel;aa:bb;-67\r\n\r\n-2;2;Lobby;cc:dd;-81\n";
        let records = SurveyLog::new().parse(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].position, 3.0);
        assert_eq!(records[0].emitter_id, "aa:bb");
        assert_eq!(records[1].position, -2.0);
        assert_eq!(records[1].signal, -81.0);
        assert_eq!(records[1].index, 2);
    }

    #[test]
    fn test_name_with_semicolon() {
        let records = SurveyLog::new().parse("1;4;a;b;c;11:22;-70").unwrap();
        assert_eq!(records[0].name, "a;b;c");
        assert_eq!(records[0].emitter_id, "11:22");
        assert_eq!(records[0].signal, -70.0);
    }

    #[test]
    fn test_malformed_lines() {
        let err = SurveyLog::new().parse("1;2;-70").unwrap_err();
        assert!(matches!(err, RecordError::Malformed { line: 1, .. }));

        let err = SurveyLog::new().parse("x;1;n;id1;-70").unwrap_err();
        assert_eq!(
            err,
            RecordError::InvalidNumber {
                line: 1,
                field: "pos",
                value: "x".to_string()
            }
        );
    }

    #[test]
    fn test_name_filter() {
        let log = SurveyLog::with_name_filter("^Hotel").unwrap();
        let text = "0;1;Hotel-5G;aa;-60\n0;2;Neighbour;bb;-70\n";
        let records = log.parse(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].emitter_id, "aa");
    }

    #[test]
    fn test_render_then_parse() {
        let mut record = SurveyRecord::new(-1.0, "aa:bb", -64.0);
        record.name = "Hall".to_string();
        record.index = 7;
        let text = SurveyLog::render(&[record.clone()]);
        assert!(text.starts_with(SURVEY_HEADER));
        assert_eq!(SurveyLog::new().parse(&text).unwrap(), vec![record]);
    }
}
