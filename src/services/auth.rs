//! 操作员身份验证
//!
//! 启动时用邮箱+密码到身份后端换一个访问令牌，
//! 验证不过直接退出，不往下跑批

use crate::error::{AppError, AppResult};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// 身份服务
pub struct AuthService {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AuthService {
    pub fn new(base_url: &str, api_key: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Other(format!("构造 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// 用邮箱+密码验证操作员身份，返回访问令牌
    pub async fn verify(&self, email: &str, password: &str) -> AppResult<String> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Other(format!("身份验证请求失败: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Other(format!(
                "身份验证被拒绝: HTTP {}",
                status.as_u16()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Other(format!("身份验证响应解析失败: {}", e)))?;
        info!("✓ 操作员身份验证通过");
        Ok(token.access_token)
    }
}
