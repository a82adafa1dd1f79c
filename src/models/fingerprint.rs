//! 浏览器指纹档案
//!
//! 每个会话绑定一份指纹（UA、视口、WebGL 标识、canvas/webgl/audio 哈希），
//! 让自动化会话在目标站看起来像不同的真实浏览器。
//! 带种子的生成器产出可复现的档案序列。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// 常见桌面 Chrome UA，按档案轮换
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
];

const WEBGL_VENDORS: &[(&str, &str)] = &[
    ("Intel Inc.", "Intel Iris OpenGL Engine"),
    ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA GeForce GTX 1660)"),
    ("Google Inc. (AMD)", "ANGLE (AMD Radeon RX 580)"),
];

const VIEWPORTS: &[(u32, u32)] = &[(1920, 1080), (1680, 1050), (1536, 864), (1440, 900)];

/// 一份指纹档案
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintProfile {
    pub id: String,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub canvas_hash: String,
    pub webgl_hash: String,
    pub audio_hash: String,
}

/// 指纹生成器
///
/// 给定种子时输出确定性的档案序列，便于复现问题会话。
pub struct FingerprintGenerator {
    rng: StdRng,
    counter: u64,
}

impl FingerprintGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng, counter: 0 }
    }

    /// 生成下一份档案
    pub fn generate(&mut self) -> FingerprintProfile {
        self.counter += 1;
        let ua = USER_AGENTS[self.rng.gen_range(0..USER_AGENTS.len())];
        let (vendor, renderer) = WEBGL_VENDORS[self.rng.gen_range(0..WEBGL_VENDORS.len())];
        let (width, height) = VIEWPORTS[self.rng.gen_range(0..VIEWPORTS.len())];

        FingerprintProfile {
            id: format!("fp-{:04}", self.counter),
            user_agent: ua.to_string(),
            viewport_width: width,
            viewport_height: height,
            webgl_vendor: vendor.to_string(),
            webgl_renderer: renderer.to_string(),
            canvas_hash: self.random_hash(),
            webgl_hash: self.random_hash(),
            audio_hash: self.random_hash(),
        }
    }

    fn random_hash(&mut self) -> String {
        let mut out = String::with_capacity(64);
        for _ in 0..8 {
            out.push_str(&format!("{:08x}", self.rng.gen::<u32>()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let mut a = FingerprintGenerator::new(Some(42));
        let mut b = FingerprintGenerator::new(Some(42));

        let fp_a = a.generate();
        let fp_b = b.generate();

        assert_eq!(fp_a.user_agent, fp_b.user_agent);
        assert_eq!(fp_a.canvas_hash, fp_b.canvas_hash);
        assert_eq!(fp_a.webgl_hash, fp_b.webgl_hash);
        assert_eq!(fp_a.audio_hash, fp_b.audio_hash);
    }

    #[test]
    fn test_profiles_get_distinct_ids_and_hashes() {
        let mut gen = FingerprintGenerator::new(Some(7));
        let first = gen.generate();
        let second = gen.generate();

        assert_ne!(first.id, second.id);
        assert_ne!(first.canvas_hash, second.canvas_hash);
        assert_eq!(first.canvas_hash.len(), 64);
    }
}
