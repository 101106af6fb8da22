// Integration tests over the public examsearch API

mod integration {
    pub mod api_tests;
    pub mod search_tests;
    pub mod storage_tests;
}

mod helpers {
    pub mod test_harness;
}
