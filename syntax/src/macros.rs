/// Declares a `combine` parser over `&str` input with the usual where-clause boilerplate.
/// Sample sheet lines are only ever split, never converted, so no `From<Parse*Error>` bounds.
macro_rules! p (
    ($name:ident( $($arg: ident :  $arg_type: ty),* ) -> $ret:ty, $code:expr) => (
        combine::parser!{
            pub fn $name['a, I]($($arg : $arg_type),*)(I) -> $ret
                where
                [I: combine::stream::RangeStream<Range = &'a str, Token = char>,
                 I::Error: combine::ParseError<char, &'a str, <I as combine::stream::StreamOnce>::Position>]
            {
                $code
            }
        }
    );
);
