//! NetCHB 门户抓取实现
//!
//! 登录和会话探测走浏览器（门户的登录页有 JS 逻辑），
//! 各 section 的抓取走 HTTP 直连（带会话 cookie），减少门户负载。
//! 页面结构相关的解析都抽成纯函数，方便单测

use crate::infrastructure::PortalDriver;
use crate::models::{Section, SectionData, WorkItem};
use crate::services::extractor::{
    Credentials, DownloadError, LoginError, SectionError, SectionExtractor,
};
use async_trait::async_trait;
use chromiumoxide::Browser;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

// ========== 门户地址 ==========

const BASE_URL: &str = "https://www.netchb.com";
const LOGIN_URL: &str = "https://www.netchb.com/security/";
const AMS_SEARCH_URL: &str = "https://www.netchb.com/app/ams/index.jsp";
const AMS_SEARCH_POST_URL: &str = "https://www.netchb.com/app/ams/viewMawbs.do";
const ENTRIES_URL: &str = "https://www.netchb.com/app/entry/index.jsp";
const ENTRIES_SEARCH_POST_URL: &str = "https://www.netchb.com/app/entry/processViewEntries.do";
const CUSTOM_REPORT_DOWNLOAD_URL: &str =
    "https://www.netchb.com/app/entry/downloadCustomizableReport.do";
const PDF_BATCH_URL: &str = "https://www.netchb.com/app/entry/7501_Batch.pdf";

const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 18_5 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.5 Mobile/15E148 Safari/604.1";

/// NetCHB 门户
pub struct NetChbPortal {
    browser: Browser,
    http: reqwest::Client,
    download_dir: PathBuf,
    /// 登录后等待控制台出现的时间
    login_wait: Duration,
    /// broker 代码 -> entries 报表格式
    formats: BTreeMap<String, String>,
}

impl NetChbPortal {
    pub fn new(
        browser: Browser,
        download_dir: PathBuf,
        login_wait: Duration,
        formats: BTreeMap<String, String>,
    ) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| format!("构造 HTTP 客户端失败: {}", e))?;
        Ok(Self {
            browser,
            http,
            download_dir,
            login_wait,
            formats,
        })
    }

    /// 每次操作用一个新页面，互不干扰
    async fn new_driver(&self) -> Result<PortalDriver, String> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("创建页面失败: {}", e))?;
        Ok(PortalDriver::new(page))
    }

    async fn close_driver(driver: PortalDriver) {
        let page = driver.page().clone();
        if let Err(e) = page.close().await {
            debug!("关闭页面失败（忽略）: {}", e);
        }
    }

    /// 带会话 cookie 的表单 POST，返回响应正文
    async fn post_form(
        &self,
        url: &str,
        referer: &str,
        form: &[(&str, String)],
        state_blob: &JsonValue,
    ) -> Result<String, String> {
        let cookie = PortalDriver::cookie_header(state_blob)
            .ok_or_else(|| "会话状态里没有 cookie".to_string())?;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::COOKIE, cookie)
            .header(reqwest::header::REFERER, referer)
            .header(reqwest::header::ORIGIN, BASE_URL)
            .form(form)
            .send()
            .await
            .map_err(|e| format!("请求 {} 失败: {}", url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} 返回 HTTP {}", url, status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| format!("读取 {} 响应失败: {}", url, e))
    }

    /// 带会话 cookie 的 GET
    async fn get_page(&self, url: &str, state_blob: &JsonValue) -> Result<String, String> {
        let cookie = PortalDriver::cookie_header(state_blob)
            .ok_or_else(|| "会话状态里没有 cookie".to_string())?;
        let response = self
            .http
            .get(url)
            .header(reqwest::header::COOKIE, cookie)
            .header(reqwest::header::REFERER, AMS_SEARCH_POST_URL)
            .send()
            .await
            .map_err(|e| format!("请求 {} 失败: {}", url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} 返回 HTTP {}", url, status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| format!("读取 {} 响应失败: {}", url, e))
    }

    // ========== Summary section (AMS) ==========

    async fn extract_summary(
        &self,
        state_blob: &JsonValue,
        item: &WorkItem,
    ) -> Result<SectionData, SectionError> {
        let digits = &item.mawb;
        let (prefix, number) = (&digits[..3], &digits[3..]);

        let form = ams_search_form(prefix, number);
        let html = self
            .post_form(AMS_SEARCH_POST_URL, AMS_SEARCH_POST_URL, &form, state_blob)
            .await
            .map_err(|e| SectionError::extraction(Section::Summary, e))?;

        let search = parse_ams_search_results(&html)
            .ok_or_else(|| SectionError::extraction(Section::Summary, "搜索结果解析失败"))?;

        let mut fields = BTreeMap::new();
        if search.master_not_found {
            info!("🔍 AMS 未找到 master: {}", digits);
            fields.insert("Master Status".to_string(), "Not Found".to_string());
            return Ok(SectionData::with_fields(fields));
        }
        fields.insert("Master Status".to_string(), "Found".to_string());
        fields.insert("AMS Total HAWBs".to_string(), search.total_hawbs.clone());
        fields.insert("AMS Arrival Date".to_string(), search.arrival_date.clone());

        let master_link = search
            .master_link
            .ok_or_else(|| SectionError::extraction(Section::Summary, "搜索结果里没有 master 链接"))?;

        let master_html = self
            .get_page(&master_link, state_blob)
            .await
            .map_err(|e| SectionError::extraction(Section::Summary, e))?;
        let master = parse_ams_master_page(&master_html);

        let t11: i64 = master.t11_entries.parse().unwrap_or(0);
        let accepted: i64 = master.entries_accepted.parse().unwrap_or(0);
        fields.insert("AMS Duty".to_string(), master.duty);
        fields.insert("AMS Total T-11 Entries".to_string(), master.t11_entries);
        fields.insert("AMS Entries Accepted".to_string(), master.entries_accepted);
        fields.insert("Rejected Entries".to_string(), (t11 - accepted).to_string());
        fields.insert("7501 Total Houses".to_string(), master.houses_7501);

        Ok(SectionData::with_fields(fields))
    }

    // ========== Entries section ==========

    async fn fetch_entries(
        &self,
        state_blob: &JsonValue,
        item: &WorkItem,
    ) -> Result<EntriesData, String> {
        let form = entries_search_form(&item.mawb);
        let html = self
            .post_form(ENTRIES_SEARCH_POST_URL, ENTRIES_URL, &form, state_blob)
            .await?;
        Ok(parse_entries_search_results(&html))
    }

    async fn extract_entries(
        &self,
        state_blob: &JsonValue,
        item: &WorkItem,
    ) -> Result<SectionData, SectionError> {
        let entries = self
            .fetch_entries(state_blob, item)
            .await
            .map_err(|e| SectionError::extraction(Section::Entries, e))?;

        let mut fields = BTreeMap::new();
        if entries.not_found {
            info!("🔍 未找到 entries: {}", item.mawb);
            fields.insert("Entries Status".to_string(), "Not Found".to_string());
            return Ok(SectionData::with_fields(fields));
        }
        fields.insert("Entries Status".to_string(), "Found".to_string());
        if let Some(date) = &entries.oldest_entry_date {
            fields.insert("Entry Date".to_string(), date.clone());
        }
        fields.insert(
            "Entry Count".to_string(),
            entries.entry_numbers.len().to_string(),
        );
        Ok(SectionData::with_fields(fields))
    }

    // ========== Custom report section ==========

    async fn extract_custom_report(
        &self,
        state_blob: &JsonValue,
        item: &WorkItem,
    ) -> Result<SectionData, SectionError> {
        // 报表需要最早的 entry 日期做起始条件
        let entries = self
            .fetch_entries(state_blob, item)
            .await
            .map_err(|e| SectionError::extraction(Section::CustomReport, e))?;
        if entries.not_found {
            return Err(SectionError::extraction(
                Section::CustomReport,
                "没有 entries，报表无从生成",
            ));
        }
        let begin = entries.oldest_entry_date.clone().unwrap_or_default();

        let format = self
            .formats
            .get(&item.broker_code)
            .cloned()
            .unwrap_or_else(|| "allied".to_string());

        let form: Vec<(&str, String)> = vec![
            ("masterBill", item.mawb.clone()),
            ("begin", begin),
            ("end", String::new()),
            ("searchTimePeriod", "Y1".to_string()),
            ("location", "0".to_string()),
            ("user", String::new()),
            ("outputFormat", "csv".to_string()),
        ];
        let body = self
            .post_form(CUSTOM_REPORT_DOWNLOAD_URL, ENTRIES_URL, &form, state_blob)
            .await
            .map_err(|e| SectionError::extraction(Section::CustomReport, e))?;

        let fields = parse_custom_report_csv(&body, &format);
        if fields.is_empty() {
            return Err(SectionError::extraction(
                Section::CustomReport,
                "报表内容为空或格式不符",
            ));
        }
        Ok(SectionData::with_fields(fields))
    }
}

#[async_trait]
impl SectionExtractor for NetChbPortal {
    async fn login(
        &self,
        broker_code: &str,
        credentials: &Credentials,
    ) -> Result<JsonValue, LoginError> {
        info!("🔐 [{}] 开始登录 NetCHB...", broker_code);
        let driver = self
            .new_driver()
            .await
            .map_err(LoginError::Interaction)?;

        let result = async {
            driver
                .goto(LOGIN_URL)
                .await
                .map_err(|e| LoginError::Interaction(e.to_string()))?;
            driver
                .fill("#lName", &credentials.username)
                .await
                .map_err(|e| LoginError::Interaction(e.to_string()))?;
            driver
                .fill("#pass", &credentials.password)
                .await
                .map_err(|e| LoginError::Interaction(e.to_string()))?;
            driver
                .click("input[type=submit]")
                .await
                .map_err(|e| LoginError::Interaction(e.to_string()))?;

            // 登录成功的标志是控制台菜单出现
            if driver.wait_for("#menuTableBody", self.login_wait).await.is_err() {
                let url = driver.current_url().await.unwrap_or_default();
                if url.contains("/security") {
                    return Err(LoginError::CredentialsRejected {
                        broker: broker_code.to_string(),
                    });
                }
                return Err(LoginError::Timeout);
            }

            driver
                .export_state()
                .await
                .map_err(|e| LoginError::Interaction(e.to_string()))
        }
        .await;

        Self::close_driver(driver).await;
        match &result {
            Ok(_) => info!("✅ [{}] 登录成功", broker_code),
            Err(e) => warn!("⚠️ [{}] 登录失败: {}", broker_code, e),
        }
        result
    }

    async fn probe(&self, state_blob: &JsonValue) -> bool {
        let driver = match self.new_driver().await {
            Ok(d) => d,
            Err(e) => {
                warn!("⚠️ 会话探测无法创建页面: {}", e);
                return false;
            }
        };

        let valid = async {
            driver.restore_state(state_blob).await.ok()?;
            driver.goto(AMS_SEARCH_URL).await.ok()?;
            let url = driver.current_url().await.ok()?;
            // 被踢回登录页说明会话失效
            if url.contains("/security") {
                return Some(false);
            }
            let html = driver.content().await.ok()?;
            Some(!html.to_lowercase().contains("id=\"lname\""))
        }
        .await
        .unwrap_or(false);

        Self::close_driver(driver).await;
        debug!("会话探测结果: {}", if valid { "有效" } else { "无效" });
        valid
    }

    async fn extract(
        &self,
        state_blob: &JsonValue,
        section: Section,
        item: &WorkItem,
    ) -> Result<SectionData, SectionError> {
        match section {
            Section::Summary => self.extract_summary(state_blob, item).await,
            Section::Entries => self.extract_entries(state_blob, item).await,
            Section::CustomReport => self.extract_custom_report(state_blob, item).await,
            Section::Document => {
                let path = self
                    .download_document(state_blob, item)
                    .await
                    .map_err(|e| SectionError::extraction(Section::Document, e.to_string()))?;
                Ok(SectionData::with_document(path))
            }
        }
    }

    async fn download_document(
        &self,
        state_blob: &JsonValue,
        item: &WorkItem,
    ) -> Result<PathBuf, DownloadError> {
        let entries = self
            .fetch_entries(state_blob, item)
            .await
            .map_err(DownloadError::RequestFailed)?;
        if entries.not_found || entries.entry_numbers.is_empty() {
            return Err(DownloadError::NotAvailable);
        }

        let cookie = PortalDriver::cookie_header(state_blob)
            .ok_or_else(|| DownloadError::RequestFailed("会话状态里没有 cookie".to_string()))?;
        let signed_date = chrono::Local::now().format("%m%d%y").to_string();
        let entry_nos = entries.entry_numbers.join(",");
        info!(
            "📦 生成 7501 批量 PDF: {} 个 entry（可能需要数分钟）",
            entries.entry_numbers.len()
        );

        let form: Vec<(&str, String)> = vec![
            ("signature", String::new()),
            ("digitalSignature", String::new()),
            ("signedDate", signed_date),
            ("broker", "false".to_string()),
            ("cashier", "false".to_string()),
            ("record", "false".to_string()),
            ("original", "false".to_string()),
            ("multiple", "false".to_string()),
            ("type7501", "2".to_string()),
            ("separateConsignees", "false".to_string()),
            ("printPartNumbers", "false".to_string()),
            ("printMfrName", "false".to_string()),
            ("entryNoBlank", "false".to_string()),
            ("entryNos", entry_nos),
            ("type", "6".to_string()),
        ];

        // 批量 PDF 生成很慢，单独放宽超时
        let response = self
            .http
            .post(PDF_BATCH_URL)
            .timeout(Duration::from_secs(1800))
            .header(reqwest::header::COOKIE, cookie)
            .header(reqwest::header::REFERER, ENTRIES_URL)
            .form(&form)
            .send()
            .await
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status: status.as_u16(),
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.to_lowercase().contains("pdf") {
            // 门户有时返回 HTML 错误页而不是 PDF
            return Err(DownloadError::RequestFailed(format!(
                "响应不是 PDF (content-type: {})",
                content_type
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self
            .download_dir
            .join(format!("{}_7501_batch.pdf", item.mawb));
        tokio::fs::write(&path, &bytes).await?;
        info!("✓ PDF 已保存: {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

// ========== 表单构造 ==========

fn ams_search_form(prefix: &str, number: &str) -> Vec<(&'static str, String)> {
    vec![
        ("prefix", prefix.to_string()),
        ("mawb", number.to_string()),
        ("refNo", String::new()),
        ("hawb", String::new()),
        ("arrivalBegin", String::new()),
        ("arrivalEnd", String::new()),
        ("container", String::new()),
        ("cbpStatus", String::new()),
        ("acasStatus", String::new()),
        ("arrivalAirport", String::new()),
        ("carrier", String::new()),
        ("flight", String::new()),
        ("client", "0".to_string()),
        ("clientName", String::new()),
        ("searchByProfile", "true".to_string()),
        ("searchTimePeriod", "Y1".to_string()),
        ("location", "0".to_string()),
        ("user", String::new()),
        ("noPerPage", "25".to_string()),
        ("cfs", "false".to_string()),
        ("pageNo", "0".to_string()),
        ("orderBy", "amb1".to_string()),
    ]
}

fn entries_search_form(mawb_digits: &str) -> Vec<(&'static str, String)> {
    vec![
        ("entryNoSearch", String::new()),
        ("brokerRefNo", String::new()),
        ("importerRecord", "0".to_string()),
        ("importerRecordName", String::new()),
        ("importerSearchByProfile", "true".to_string()),
        ("ultimateConsignee", "0".to_string()),
        ("ultimateConsigneeName", String::new()),
        ("ultimateConsigneeSearchByProfile", "true".to_string()),
        ("freightForwarder", "0".to_string()),
        ("freightForwarderName", String::new()),
        ("freightForwarderSearchByProfile", "true".to_string()),
        ("begin", String::new()),
        ("end", String::new()),
        ("entryStatus", String::new()),
        ("cargoReleaseStatus", String::new()),
        ("manifestStatus", String::new()),
        ("pgaAgency", String::new()),
        ("ogaStatus", String::new()),
        ("statusColor", String::new()),
        ("entryType", String::new()),
        ("portEntry", String::new()),
        ("modeTransport", String::new()),
        ("masterBill", mawb_digits.to_string()),
        ("searchTimePeriod", "Y1".to_string()),
        ("user", String::new()),
        ("location", "0".to_string()),
        ("noPerPage", "1000".to_string()),
        ("entryNo", "0".to_string()),
        ("orderBy", "vep1".to_string()),
    ]
}

// ========== HTML/CSV 解析（纯函数） ==========

#[derive(Debug, Default)]
struct AmsSearchData {
    master_not_found: bool,
    master_link: Option<String>,
    total_hawbs: String,
    arrival_date: String,
}

#[derive(Debug, Default)]
struct AmsMasterData {
    duty: String,
    t11_entries: String,
    entries_accepted: String,
    houses_7501: String,
}

#[derive(Debug, Default)]
struct EntriesData {
    not_found: bool,
    oldest_entry_date: Option<String>,
    entry_numbers: Vec<String>,
}

/// 去掉 HTML 标签并压缩空白
fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 取 id 对应元素的文本内容
fn element_text_by_id(html: &str, id: &str) -> Option<String> {
    let pattern = format!(r#"(?is)id="{}"[^>]*>(.*?)</"#, regex::escape(id));
    let re = Regex::new(&pattern).ok()?;
    let captured = re.captures(html)?.get(1)?.as_str();
    let text = strip_tags(captured);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_currency(value: &str) -> f64 {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

/// AMS 搜索结果页：第一行数据 + master 链接
fn parse_ams_search_results(html: &str) -> Option<AmsSearchData> {
    let lower = html.to_lowercase();
    if lower.contains("there is no awb") || lower.contains("no awb") {
        return Some(AmsSearchData {
            master_not_found: true,
            ..Default::default()
        });
    }

    let row_re = Regex::new(r#"(?is)<tr[^>]*class="(?:light|dark)"[^>]*>(.*?)</tr>"#).ok()?;
    let row = match row_re.captures(html) {
        Some(c) => c.get(1)?.as_str().to_string(),
        None => {
            // 没有结果行同样按 master 不存在处理
            return Some(AmsSearchData {
                master_not_found: true,
                ..Default::default()
            });
        }
    };

    let cell_re = Regex::new(r"(?is)<td[^>]*>(.*?)</td>").ok()?;
    let cells: Vec<String> = cell_re
        .captures_iter(&row)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    if cells.len() < 7 {
        return None;
    }

    let link_re = Regex::new(r#"(?is)href="([^"]*mawbMenu\.do[^"]*)""#).ok()?;
    let master_link = link_re.captures(&row).and_then(|c| c.get(1)).map(|m| {
        let href = m.as_str().replace("&amp;", "&");
        if href.starts_with('/') {
            format!("{}{}", BASE_URL, href)
        } else {
            href
        }
    });

    let arrival_date = {
        let text = strip_tags(&cells[5]);
        if text.is_empty() { "N/A".to_string() } else { text }
    };
    let total_hawbs = {
        let text = strip_tags(&cells[6]);
        if text.is_empty() { "N/A".to_string() } else { text }
    };

    Some(AmsSearchData {
        master_not_found: false,
        master_link,
        total_hawbs,
        arrival_date,
    })
}

/// AMS master 页：#esD 税额、#esC T-11、#esA accepted、#esH houses
fn parse_ams_master_page(html: &str) -> AmsMasterData {
    let duty = element_text_by_id(html, "esD").unwrap_or_else(|| "N/A".to_string());
    let t11 = element_text_by_id(html, "esC")
        .and_then(|t| t.replace(',', "").parse::<i64>().ok())
        .unwrap_or(0);
    let accepted = element_text_by_id(html, "esA")
        .and_then(|t| t.replace(',', "").parse::<i64>().ok())
        .unwrap_or(0);
    let houses = element_text_by_id(html, "esH")
        .and_then(|t| t.replace(',', "").parse::<i64>().ok())
        .unwrap_or(0);
    AmsMasterData {
        duty,
        t11_entries: t11.to_string(),
        entries_accepted: accepted.to_string(),
        houses_7501: houses.to_string(),
    }
}

/// Entries 搜索结果页：entry 号列表 + 最早 entry 日期
fn parse_entries_search_results(html: &str) -> EntriesData {
    let lower = html.to_lowercase();
    if lower.contains("there are no entries") || lower.contains("no entries found") {
        return EntriesData {
            not_found: true,
            ..Default::default()
        };
    }

    let mut entry_numbers = Vec::new();
    if let Ok(re) = Regex::new(r#"viewEntry\.do\?entryNo=(\d+)"#) {
        for cap in re.captures_iter(html) {
            if let Some(m) = cap.get(1) {
                let no = m.as_str().to_string();
                if !entry_numbers.contains(&no) {
                    entry_numbers.push(no);
                }
            }
        }
    }
    if entry_numbers.is_empty() {
        return EntriesData {
            not_found: true,
            ..Default::default()
        };
    }

    // 结果行里的 mm/dd/yy 日期取最早的当 Entry Date
    let mut oldest: Option<(i32, u32, u32, String)> = None;
    if let Ok(re) = Regex::new(r"\b(\d{2})/(\d{2})/(\d{2})\b") {
        for cap in re.captures_iter(html) {
            let (m, d, y) = (
                cap[1].parse::<u32>().unwrap_or(0),
                cap[2].parse::<u32>().unwrap_or(0),
                cap[3].parse::<i32>().unwrap_or(0),
            );
            if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
                continue;
            }
            let key = (2000 + y, m, d, cap[0].to_string());
            if oldest.as_ref().map(|o| key < *o).unwrap_or(true) {
                oldest = Some(key);
            }
        }
    }

    EntriesData {
        not_found: false,
        oldest_entry_date: oldest.map(|(_, _, _, text)| text),
        entry_numbers,
    }
}

/// 按格式把报表 CSV 聚合成汇总字段
///
/// 两种模板的列位置不同：
/// - fte 类：informal=列4，complete=列6，entry date=列2，release date=列8，house 标记=列13
/// - shoaib 类：按列0 去重后求和，informal=列5，complete=列7，entry date=列3，release date=列9
fn parse_custom_report_csv(body: &str, format: &str) -> BTreeMap<String, String> {
    let shoaib = format.to_lowercase().contains("shoaib");
    let (idx_informal, idx_complete, idx_entry_date, idx_release, idx_house) = if shoaib {
        (5usize, 7usize, 3usize, 9usize, 13usize)
    } else {
        (4, 6, 2, 8, 13)
    };

    let mut total_informal = 0.0f64;
    let mut complete_duty = 0.0f64;
    let mut total_house = 0usize;
    let mut entry_dates = std::collections::BTreeSet::new();
    let mut release_dates = std::collections::BTreeSet::new();
    let mut seen_keys = std::collections::BTreeSet::new();
    let mut data_rows = 0usize;

    for line in body.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let cols = split_csv_line(line);
        data_rows += 1;

        // shoaib 格式按首列去重计税
        let count_duty = if shoaib {
            let key = cols.first().cloned().unwrap_or_default();
            seen_keys.insert(key)
        } else {
            true
        };
        if count_duty {
            total_informal += cols
                .get(idx_informal)
                .map(|v| parse_currency(v))
                .unwrap_or(0.0);
            complete_duty += cols
                .get(idx_complete)
                .map(|v| parse_currency(v))
                .unwrap_or(0.0);
        }
        if cols.get(idx_house).map(|v| !v.is_empty()).unwrap_or(false) {
            total_house += 1;
        }
        if let Some(d) = cols.get(idx_entry_date).filter(|v| !v.is_empty()) {
            entry_dates.insert(d.clone());
        }
        if let Some(d) = cols.get(idx_release).filter(|v| !v.is_empty()) {
            release_dates.insert(d.clone());
        }
    }

    if data_rows == 0 {
        return BTreeMap::new();
    }

    let total_duty = total_informal + complete_duty;
    let mut fields = BTreeMap::new();
    fields.insert("Report Duty".to_string(), format!("{:.2}", total_duty));
    fields.insert("Report Total House".to_string(), total_house.to_string());
    fields.insert(
        "Total Informal Duty".to_string(),
        format!("{:.2}", total_informal),
    );
    fields.insert(
        "Complete Total Duty".to_string(),
        format!("{:.2}", complete_duty),
    );
    let join = |set: &std::collections::BTreeSet<String>| {
        if set.is_empty() {
            "N/A".to_string()
        } else {
            set.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    };
    fields.insert("Entry Date".to_string(), join(&entry_dates));
    fields.insert("Cargo Release Date".to_string(), join(&release_dates));
    fields
}

/// 最简 CSV 行拆分（支持双引号包裹的逗号）
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cols = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cols.push(current.trim().to_string());
                current = String::new();
            }
            c => current.push(c),
        }
    }
    cols.push(current.trim().to_string());
    cols
}
