use std::process::Command;

fn main() {
    // Only rebuild CSS when template or CSS files change
    println!("cargo:rerun-if-changed=assets/css/input.css");
    println!("cargo:rerun-if-changed=templates/");

    // Try to run Tailwind CSS standalone CLI
    let status = Command::new("tailwindcss")
        .args([
            "-i",
            "assets/css/input.css",
            "-o",
            "assets/css/output.css",
            "--minify",
        ])
        .status();

    match status {
        Ok(s) if s.success() => {
            println!("cargo:warning=Tailwind CSS compiled successfully");
        }
        _ => {
            // Tailwind CLI not available, write a minimal fallback stylesheet
            println!("cargo:warning=Tailwind CLI not found, using fallback CSS");
            let fallback = r#"*, *::before, *::after { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: system-ui, -apple-system, sans-serif; line-height: 1.6; color: #1c1917; background: #fafaf9; -webkit-font-smoothing: antialiased; }
.container { max-width: 56rem; margin: 0 auto; padding: 1.5rem 1rem; }
.narrow { max-width: 28rem; }
.flex { display: flex; }
.items-center { align-items: center; }
.justify-between { justify-content: space-between; }
.gap-3 { gap: 0.75rem; }
.text-sm { font-size: 0.875rem; }
.font-bold { font-weight: 700; }
.text-stone-500 { color: #78716c; }
.bg-stone-50 { background-color: #fafaf9; }
h1 { font-size: 1.5rem; margin: 1rem 0; }
h2 { font-size: 1.125rem; margin: 0.5rem 0; }
a { color: inherit; }
img { max-width: 100%; border-radius: 0.5rem; }
input, textarea, select { font: inherit; padding: 0.5rem; border: 1px solid #d6d3d1; border-radius: 0.5rem; width: 100%; }
label { display: block; margin-bottom: 0.75rem; font-size: 0.875rem; }
.btn { display: inline-flex; align-items: center; justify-content: center; padding: 0.5rem 1rem; border-radius: 0.5rem; font-size: 0.875rem; font-weight: 500; background: #1c1917; color: #fff; border: none; cursor: pointer; text-decoration: none; }
.btn:hover { background: #44403c; }
.btn-link { background: none; border: none; color: #78716c; font-size: 0.875rem; text-decoration: underline; cursor: pointer; padding: 0; }
.card { background: #fff; border-radius: 0.75rem; border: 1px solid #e7e5e4; padding: 1.5rem; box-shadow: 0 1px 2px 0 rgb(0 0 0 / 0.05); margin-bottom: 1rem; }
.grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(16rem, 1fr)); gap: 1rem; }
.nav { display: flex; align-items: center; justify-content: space-between; max-width: 56rem; margin: 0 auto; padding: 0.75rem 1rem; border-bottom: 1px solid #e7e5e4; }
.nav nav { display: flex; align-items: center; gap: 0.75rem; }
.search { display: flex; gap: 0.75rem; margin-bottom: 1.5rem; }
.error { color: #b91c1c; background: #fef2f2; border: 1px solid #fecaca; border-radius: 0.5rem; padding: 0.75rem 1rem; margin: 1rem 0; font-size: 0.875rem; }
.tags { margin-top: 0.5rem; }
.tag { font-size: 0.75rem; color: #57534e; background: #f5f5f4; border-radius: 9999px; padding: 0.125rem 0.625rem; text-decoration: none; }
.stack { display: flex; flex-direction: column; gap: 0.75rem; }
.list { list-style: none; }
.list li { padding: 0.5rem 0; border-bottom: 1px solid #f5f5f4; }
.comments { margin-top: 2rem; }
.comment { border-top: 1px solid #f5f5f4; padding: 0.75rem 0; }
.comment-form textarea { margin-bottom: 0.5rem; }
.pagination { display: flex; align-items: center; justify-content: space-between; padding: 1.5rem 0; }
.detail-img { border-radius: 0.5rem; margin-bottom: 1rem; }
"#;
            std::fs::create_dir_all("assets/css").ok();
            std::fs::write("assets/css/output.css", fallback).ok();
        }
    }
}
