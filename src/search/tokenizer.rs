//! Analyzer - uses jieba-rs for CJK word segmentation / 分词器
//!
//! Supports / 支持：
//! - Chinese word segmentation (jieba, search mode) / 中文分词
//! - Latin text split on non-word characters + lowercase / 英文分词
//! - Traditional → simplified folding so both forms match / 简繁匹配

use jieba_rs::Jieba;
use once_cell::sync::Lazy;

/// Global jieba tokenizer instance / 全局 jieba 分词器实例
static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

/// Tokenize text for indexing / 对文本进行分词
///
/// Tokens are lowercased and folded to simplified characters. Tokens without
/// any alphanumeric character (whitespace, punctuation) are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    // Fold first so jieba sees the simplified form / 先转简体再分词
    let text = to_simplified(text);
    JIEBA
        .cut_for_search(&text, true)
        .into_iter()
        .filter_map(|word| {
            let word = word.trim();
            if !word.chars().any(char::is_alphanumeric) {
                return None;
            }
            Some(word.to_lowercase())
        })
        .collect()
}

/// Normalize a single query term the same way indexed tokens are / 规范化查询词
pub fn normalize_term(term: &str) -> String {
    fold(term.trim())
}

fn fold(word: &str) -> String {
    to_simplified(&word.to_lowercase())
}

/// 繁体转简体（常用字映射）
pub fn to_simplified(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '國' => '国', '學' => '学', '書' => '书', '電' => '电', '話' => '话',
            '語' => '语', '說' => '说', '讀' => '读', '寫' => '写', '檔' => '档',
            '開' => '开', '關' => '关', '門' => '门', '問' => '问', '時' => '时',
            '會' => '会', '應' => '应', '對' => '对', '為' => '为', '無' => '无',
            '來' => '来', '後' => '后', '發' => '发', '動' => '动', '機' => '机',
            '網' => '网', '頁' => '页', '圖' => '图', '數' => '数', '據' => '据',
            '尋' => '寻', '庫' => '库', '們' => '们', '這' => '这', '個' => '个',
            '錄' => '录', '檢' => '检', '結' => '结', '題' => '题', '類' => '类',
            '資' => '资', '訊' => '讯', '設' => '设', '計' => '计', '標' => '标',
            '準' => '准', '體' => '体', '統' => '统', '係' => '系', '論' => '论',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_english() {
        let tokens = tokenize("Hello World, Test!");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"world".to_string()));
        assert!(tokens.contains(&"test".to_string()));
        assert!(tokens.iter().all(|t| t.chars().any(char::is_alphanumeric)));
    }

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("中华人民共和国");
        assert!(!tokens.is_empty());
        assert!(tokens.iter().all(|t| "中华人民共和国".contains(t.as_str())));
    }

    #[test]
    fn test_traditional_folds_to_simplified() {
        assert_eq!(normalize_term("資料庫"), "资料库");
        assert_eq!(normalize_term("  RUST "), "rust");
    }

    #[test]
    fn test_mixed_script_keeps_both_parts() {
        let tokens = tokenize("Rust测试，");
        assert!(tokens.contains(&"rust".to_string()));
        assert!(tokens.iter().any(|t| t.contains('测')));
        assert!(tokens.iter().all(|t| t.chars().any(char::is_alphanumeric)));
    }
}
