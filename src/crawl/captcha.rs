// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing::warn;

use crate::driver::traits::PageSession;
use crate::utils::errors::StageError;

/// 人机验证容器的选择器
const CAPTCHA_SELECTOR: &str = ".captcha-container";

/// 人机验证守卫
///
/// 检查已加载页面是否为反爬挑战页。检查是先行性的：
/// 通过检查不代表后续请求不会再遇到挑战。
pub struct CaptchaGuard;

impl CaptchaGuard {
    /// 检查当前页面
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 页面正常
    /// * `Err(StageError::CaptchaDetected)` - 页面为挑战页
    pub async fn check(&self, session: &dyn PageSession) -> Result<(), StageError> {
        if session.has_element(CAPTCHA_SELECTOR).await? {
            warn!("Challenge page detected");
            return Err(StageError::CaptchaDetected);
        }
        Ok(())
    }
}
