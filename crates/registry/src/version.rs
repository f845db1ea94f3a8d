use std::cmp::Ordering;

/// 比较两个点分数字版本号
///
/// 缺失的分量按 0 处理（`1.2` == `1.2.0`）；忽略前缀 `v` 以及 `-` / `+` 之后的
/// 预发布与构建信息；无法解析为数字的分量按 0 处理。
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = version_components(a);
    let right = version_components(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// `version` 是否不低于 `min_version`
pub fn satisfies_min_version(version: &str, min_version: &str) -> bool {
    compare_versions(version, min_version) != Ordering::Less
}

fn version_components(version: &str) -> Vec<u64> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let core = trimmed.split(['-', '+']).next().unwrap_or("");

    if core.is_empty() {
        return Vec::new();
    }
    core.split('.')
        .map(|part| part.trim().parse::<u64>().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("0.9", "1"), Ordering::Less);
    }

    #[test]
    fn test_prefix_and_suffix_ignored() {
        assert_eq!(compare_versions("v1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare_versions("1.2.3-beta.1", "1.2.3"), Ordering::Equal);
        assert_eq!(compare_versions("1.2.3+build5", "1.2.2"), Ordering::Greater);
    }

    #[test]
    fn test_non_numeric_components() {
        assert_eq!(compare_versions("1.x", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("", "0.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_satisfies_min_version() {
        assert!(satisfies_min_version("2.1.0", "2.0"));
        assert!(satisfies_min_version("2.0.0", "2.0"));
        assert!(!satisfies_min_version("1.9", "2.0"));
    }
}
