//! 汇总报告生成
//!
//! 把一个任务抓到的 summary 字段汇编成 CSV 报告文件（上传用的产物）

use crate::models::{ProcessingJob, WorkItem};
use std::path::{Path, PathBuf};
use tracing::info;

/// 报告里字段的固定顺序
const SUMMARY_FIELD_ORDER: [&str; 14] = [
    "MAWB Number",
    "AMS Total HAWBs",
    "AMS Duty",
    "AMS Total T-11 Entries",
    "AMS Entries Accepted",
    "Rejected Entries",
    "7501 Total Houses",
    "Report Duty",
    "Report Total House",
    "Total Informal Duty",
    "Complete Total Duty",
    "Entry Date",
    "Cargo Release Date",
    "Master Status",
];

/// 生成报告的 CSV 文本
///
/// 固定顺序的字段在前（没抓到的填 N/A），其余抓到的字段按名称排在后面
pub fn build_report_csv(job: &ProcessingJob) -> String {
    let item = &job.work_item;
    let mut lines = Vec::new();
    lines.push("Field,Value".to_string());
    lines.push(csv_row("Airport Code", &item.airport_code));
    lines.push(csv_row("Broker", &item.broker_code));
    lines.push(csv_row("Service Type", &item.service_type));
    lines.push(csv_row("Flight Reference", &item.flight_reference));
    lines.push(csv_row("MAWB", &item.mawb_display()));

    let mut remaining = job.summary.clone();
    remaining.remove("MAWB Number");
    for field in SUMMARY_FIELD_ORDER {
        if field == "MAWB Number" {
            continue;
        }
        let value = remaining.remove(field).unwrap_or_else(|| "N/A".to_string());
        lines.push(csv_row(field, &value));
    }
    for (field, value) in remaining {
        lines.push(csv_row(&field, &value));
    }

    lines.join("\n") + "\n"
}

/// 把报告写到本地目录，返回文件路径
pub async fn write_report(dir: &Path, job: &ProcessingJob) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(report_file_name(&job.work_item));
    let content = build_report_csv(job);
    tokio::fs::write(&path, content).await?;
    info!("📄 报告已生成: {}", path.display());
    Ok(path)
}

/// 报告文件名：机场_航班_纯数字MAWB.csv
pub fn report_file_name(item: &WorkItem) -> String {
    format!(
        "{}_{}_{}.csv",
        item.airport_code, item.flight_reference, item.mawb
    )
}

fn csv_row(field: &str, value: &str) -> String {
    format!("{},{}", escape_csv(field), escape_csv(value))
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkItem;

    fn job() -> ProcessingJob {
        let item = WorkItem {
            broker_code: "HYX".to_string(),
            airport_code: "JFK".to_string(),
            service_type: "M3".to_string(),
            flight_reference: "3391".to_string(),
            mawb: "16005034083".to_string(),
            raw_line: String::new(),
            line_no: 1,
        };
        let mut job = ProcessingJob::new(1, item, &[]);
        job.summary
            .insert("AMS Duty".to_string(), "$1,200.00".to_string());
        job.summary
            .insert("Master Status".to_string(), "Found".to_string());
        job
    }

    #[test]
    fn report_contains_item_fields_and_summary() {
        let csv = build_report_csv(&job());
        assert!(csv.starts_with("Field,Value\n"));
        assert!(csv.contains("Airport Code,JFK"));
        assert!(csv.contains("MAWB,160-05034083"));
        // 带逗号的值要加引号
        assert!(csv.contains("AMS Duty,\"$1,200.00\""));
        // 没抓到的字段填 N/A
        assert!(csv.contains("Report Duty,N/A"));
    }

    #[test]
    fn file_name_uses_airport_flight_mawb() {
        assert_eq!(
            report_file_name(&job().work_item),
            "JFK_3391_16005034083.csv"
        );
    }
}
