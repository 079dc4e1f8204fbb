/// Print a progress step without a newline, to be closed by [`status!`].
#[macro_export]
macro_rules! step {
    ($($arg:tt)*) => {{
        print!($($arg)*);
        std::io::Write::flush(&mut std::io::stdout())?;
    }};
}

#[macro_export]
macro_rules! status {
    ($code:expr) => {{
        let ret = $code;
        match &ret {
            Ok(_) => println!(" {}", colored::Colorize::green("ok")),
            Err(_) => println!(" {}", colored::Colorize::red("failed")),
        }
        ret
    }};
}
