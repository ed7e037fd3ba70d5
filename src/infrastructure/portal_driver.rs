//! 门户驱动 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露导航/执行 JS/表单交互/会话状态的能力

use crate::error::{AppError, AppResult};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// 门户驱动
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 goto() / eval() / fill() / click() 能力
/// - 会话状态（cookies）的导出与恢复
/// - 不认识 MAWB / Section
/// - 不处理业务流程
pub struct PortalDriver {
    page: Page,
}

impl PortalDriver {
    /// 创建新的门户驱动
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 导航到指定 URL 并等待加载完成
    pub async fn goto(&self, url: &str) -> AppResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::navigation_failed(url, e))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| AppError::navigation_failed(url, e))?;
        Ok(())
    }

    /// 当前页面的 URL
    pub async fn current_url(&self) -> AppResult<String> {
        let url = self.page.url().await?;
        Ok(url.unwrap_or_default())
    }

    /// 当前页面的 HTML 内容
    pub async fn content(&self) -> AppResult<String> {
        let html = self.page.content().await?;
        Ok(html)
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 等待选择器出现，超时返回错误
    pub async fn wait_for(&self, selector: &str, timeout: Duration) -> AppResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::Other(format!("等待元素超时: {}", selector)));
            }
            sleep(Duration::from_millis(200)).await;
        }
    }

    /// 往输入框填入文本（先清空）
    pub async fn fill(&self, selector: &str, text: &str) -> AppResult<()> {
        let element = self.page.find_element(selector).await?;
        element.click().await?;
        // 清空旧值再输入
        self.eval(format!(
            "document.querySelector('{}').value = ''",
            selector
        ))
        .await?;
        element.type_str(text).await?;
        debug!("已填入 {}", selector);
        Ok(())
    }

    /// 点击选择器对应的元素
    pub async fn click(&self, selector: &str) -> AppResult<()> {
        let element = self.page.find_element(selector).await?;
        element.click().await?;
        debug!("已点击 {}", selector);
        Ok(())
    }

    /// 导出当前会话状态（cookies）为不透明 JSON blob
    pub async fn export_state(&self) -> AppResult<JsonValue> {
        let cookies = self.page.get_cookies().await?;
        let blob = serde_json::to_value(&cookies)
            .map_err(|e| AppError::Other(format!("会话状态序列化失败: {}", e)))?;
        Ok(blob)
    }

    /// 把之前导出的会话状态恢复到页面
    ///
    /// blob 不是合法的 cookie 数组时按损坏处理
    pub async fn restore_state(&self, blob: &JsonValue) -> AppResult<()> {
        let entries = blob
            .as_array()
            .ok_or_else(|| AppError::Other("会话状态不是 cookie 数组".to_string()))?;
        let mut params = Vec::with_capacity(entries.len());
        for entry in entries {
            // Cookie 比 CookieParam 多几个字段，反序列化时会被忽略
            let param: CookieParam = serde_json::from_value(entry.clone())
                .map_err(|e| AppError::Other(format!("会话 cookie 解析失败: {}", e)))?;
            params.push(param);
        }
        self.page.set_cookies(params).await?;
        debug!("已恢复 {} 条会话 cookie", entries.len());
        Ok(())
    }

    /// 把会话 blob 渲染成 HTTP Cookie 头的值（给直连下载用）
    pub fn cookie_header(blob: &JsonValue) -> Option<String> {
        let entries = blob.as_array()?;
        let pairs: Vec<String> = entries
            .iter()
            .filter_map(|c| {
                let name = c.get("name")?.as_str()?;
                let value = c.get("value")?.as_str()?;
                Some(format!("{}={}", name, value))
            })
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cookie_header_joins_pairs() {
        let blob = json!([
            {"name": "JSESSIONID", "value": "abc123", "domain": ".netchb.com"},
            {"name": "remember", "value": "1"}
        ]);
        assert_eq!(
            PortalDriver::cookie_header(&blob).unwrap(),
            "JSESSIONID=abc123; remember=1"
        );
    }

    #[test]
    fn cookie_header_rejects_non_array() {
        assert!(PortalDriver::cookie_header(&json!({"name": "x"})).is_none());
        assert!(PortalDriver::cookie_header(&json!([])).is_none());
    }
}
