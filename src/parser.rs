//! 输入解析器
//!
//! 把用户粘贴的多行文本解析成 WorkItem 序列。
//! 一行格式：`<broker> <机场> <服务类型> <航班参考号> <MAWB>`，
//! 例如 `JFK HYJ M3 3391 160-05034083`。
//!
//! 规则：
//! - 按行解析，坏行只产生一条诊断，不影响其他行
//! - 输出保持输入行顺序（结果展示顺序依赖它）
//! - 同一批次里重复的 MAWB 不去重，各自独立成任务
//! - 纯函数：同样的输入永远得到同样的输出，无 I/O

use crate::error::ParseError;
use crate::models::work_item::{is_known_station, normalize_mawb, WorkItem};

/// 解析结果：成功的工作项 + 每个坏行的诊断
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub items: Vec<WorkItem>,
    pub diagnostics: Vec<ParseError>,
}

impl ParseOutcome {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.diagnostics.is_empty()
    }
}

/// 解析一批输入文本
///
/// `known_brokers` 来自配置的 broker 表；不在表里的 broker 代码整行拒绝
pub fn parse_batch_input(text: &str, known_brokers: &[String]) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line, line_no, known_brokers) {
            Ok(item) => outcome.items.push(item),
            Err(diag) => outcome.diagnostics.push(diag),
        }
    }

    outcome
}

/// 解析单行
fn parse_line(
    line: &str,
    line_no: usize,
    known_brokers: &[String],
) -> Result<WorkItem, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 5 {
        return Err(ParseError::InvalidTokenCount {
            line_no,
            found: tokens.len(),
        });
    }

    let broker_code = tokens[0].to_ascii_uppercase();
    let airport_code = tokens[1].to_ascii_uppercase();
    let service_type = tokens[2].to_string();
    let flight_reference = tokens[3].to_string();
    let mawb_raw = tokens[4];

    if !known_brokers.iter().any(|b| b.eq_ignore_ascii_case(&broker_code)) {
        return Err(ParseError::UnknownBroker {
            line_no,
            code: broker_code,
        });
    }

    if !is_known_station(&airport_code) {
        return Err(ParseError::UnknownAirport {
            line_no,
            code: airport_code,
        });
    }

    let mawb = normalize_mawb(mawb_raw).ok_or_else(|| ParseError::InvalidMawb {
        line_no,
        mawb: mawb_raw.to_string(),
    })?;

    Ok(WorkItem {
        broker_code,
        airport_code,
        service_type,
        flight_reference,
        mawb,
        raw_line: line.to_string(),
        line_no,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brokers() -> Vec<String> {
        vec!["HYX".to_string(), "JFK".to_string()]
    }

    #[test]
    fn parses_valid_line() {
        let outcome = parse_batch_input("JFK HYJ M3 3391 160-05034083", &brokers());
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.diagnostics.is_empty());
        let item = &outcome.items[0];
        assert_eq!(item.broker_code, "JFK");
        assert_eq!(item.airport_code, "HYJ");
        assert_eq!(item.service_type, "M3");
        assert_eq!(item.flight_reference, "3391");
        assert_eq!(item.mawb, "16005034083");
        assert_eq!(item.line_no, 1);
    }

    #[test]
    fn one_bad_line_does_not_discard_the_rest() {
        let text = "JFK HYJ M3 3391 160-05034083\n\
                    JFK HYJ M3 1234\n\
                    HYX PVG M1 4250 235-94731221";
        let outcome = parse_batch_input(text, &brokers());
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].line_no(), 2);
        // 顺序保持输入顺序
        assert_eq!(outcome.items[0].line_no, 1);
        assert_eq!(outcome.items[1].line_no, 3);
    }

    #[test]
    fn rejects_bad_mawb() {
        let outcome = parse_batch_input("JFK HYJ M3 3391 1234", &brokers());
        assert!(outcome.items.is_empty());
        assert!(matches!(
            outcome.diagnostics[0],
            ParseError::InvalidMawb { .. }
        ));
    }

    #[test]
    fn rejects_unknown_broker_and_airport() {
        let text = "ZZZ HYJ M3 3391 160-05034083\nJFK QQQ M3 3391 160-05034083";
        let outcome = parse_batch_input(text, &brokers());
        assert!(outcome.items.is_empty());
        assert!(matches!(
            outcome.diagnostics[0],
            ParseError::UnknownBroker { .. }
        ));
        assert!(matches!(
            outcome.diagnostics[1],
            ParseError::UnknownAirport { .. }
        ));
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "JFK HYJ M3 3391 160-05034083\nHYX PVG M1 4250 235-94731221";
        let first = parse_batch_input(text, &brokers());
        let second = parse_batch_input(text, &brokers());
        assert_eq!(first.items, second.items);
    }

    #[test]
    fn duplicate_mawbs_are_kept() {
        let text = "JFK HYJ M3 3391 160-05034083\nJFK HYJ M3 3391 160-05034083";
        let outcome = parse_batch_input(text, &brokers());
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.items[0].mawb, outcome.items[1].mawb);
    }

    #[test]
    fn empty_and_blank_lines_are_ignored() {
        let outcome = parse_batch_input("\n   \n\n", &brokers());
        assert!(outcome.is_empty());
    }
}
