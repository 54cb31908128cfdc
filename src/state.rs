/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 * - Clone 前提で持つ (内部は Copy / Arc)
 */
use crate::config::AppEnv;

#[derive(Clone, Debug)]
pub struct AppState {
    pub app_env: AppEnv,
}

impl AppState {
    pub fn new(app_env: AppEnv) -> Self {
        Self { app_env }
    }
}
