// Changes the process working directory, so it lives in its own test binary.
mod common;

use std::fs;
use std::path::Path;

use common::Fixture;
use sbuild::commands::{self, BuildOptions};
use sbuild::tools::system::GnuPatch;
use sbuild::workspace::Layout;

const URL: &str = "https://example.org/hello-1.0.tar.gz";

#[test]
fn relative_root_installs_into_its_own_destdir() {
    let mut fx = Fixture::new();
    let tree = fx.scratch("trees/hello");
    fs::create_dir_all(&tree).expect("mkdir tree");
    fs::write(tree.join("hello.txt"), "hello\n").expect("write hello.txt");
    fx.serve_archive(URL, &tree);

    fs::create_dir_all(fx.root.join("patches")).expect("mkdir patches");
    fs::write(
        fx.root.join("patches/greeting.patch"),
        "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-hello\n+patched\n",
    )
    .expect("write patch");
    fx.write_recipe(
        "hello",
        &format!(
            "[package]\nname=hello\nversion=1.0\nsource={URL}\nfakeroot=no\npatches=patches/greeting.patch\n[build]\ninstall=mkdir -p \"$DESTDIR/usr/share\" && cp hello.txt \"$DESTDIR/usr/share/hello.txt\"\n"
        ),
    );

    std::env::set_current_dir(fx.tmp.path()).expect("chdir");
    let mut tools = fx.toolbox();
    tools.patcher = Box::new(GnuPatch::new("patch"));
    let s = fx.session_with(Layout::with_defaults(Path::new("root")), tools);
    assert!(s.layout.root.is_absolute());
    assert!(s.layout.destdir.is_absolute());

    let installed =
        commands::build_install(&s, "hello", BuildOptions::default()).expect("build/install");
    assert_eq!(installed.files, vec!["/usr/share/hello.txt"]);
    assert_eq!(
        fs::read_to_string(fx.root.join("destdir/hello-1.0/usr/share/hello.txt"))
            .expect("staged file"),
        "patched\n"
    );
    assert!(!fx.root.join("work/hello-1.0/root").exists());
}
