mod helpers;

mod bucket_tests;
mod gc_tests;
