use vergen::EmitBuilder;

fn main() {
    // 生成构建信息，供 --version 使用
    EmitBuilder::builder()
        .all_build()
        .emit()
        .expect("Failed to generate build information");
}
