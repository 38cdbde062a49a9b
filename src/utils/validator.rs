use anyhow::Result;

const FORBIDDEN_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// 把文件系统不允许的字符替换为 `_`，并去掉首尾空白
pub fn secure_filename(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// 专辑 ID 只能由字母和数字组成
pub fn validate_album_id(album_id: &str) -> Result<()> {
    if album_id.is_empty() {
        anyhow::bail!("专辑 ID 不能为空");
    }
    if !album_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        anyhow::bail!("无效的专辑 ID: {}", album_id);
    }
    Ok(())
}

/// 解析曲目编号，任意非数字字符都视为分隔符；结果去重、升序，0 被忽略
pub fn parse_track_numbers<S: AsRef<str>>(inputs: &[S]) -> Vec<u32> {
    let mut numbers: Vec<u32> = inputs
        .iter()
        .flat_map(|input| {
            input
                .as_ref()
                .split(|c: char| !c.is_ascii_digit())
                .filter_map(|part| part.parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|n| *n > 0)
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

/// 读取专辑列表文件：每行一个 ID，忽略空行和 `#` 开头的注释
pub fn parse_album_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
